use std::path::{Path, PathBuf};
use std::process::ExitCode;

use pdf_image_extract::config::merged::MergedConfig;
use pdf_image_extract::config::{self};
use pdf_image_extract::logging::{RunContext, build_dispatch, run_log_path};
use pdf_image_extract::pipeline::job_runner::JobConfig;
use pdf_image_extract::pipeline::orchestrator::run_all_jobs;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.is_empty() || args.iter().any(|a| a == "--help" || a == "-h") {
        eprintln!("Usage: pdf_image_extract <jobs.yaml>...");
        eprintln!("  Extract embedded images from PDF files according to job specifications.");
        return if args.is_empty() {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        };
    }

    if args.iter().any(|a| a == "--version" || a == "-V") {
        eprintln!("pdf_image_extract {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    // Collect job configs and their log directories from all job files.
    let mut job_configs: Vec<JobConfig> = Vec::new();
    let mut log_dirs: Vec<Option<PathBuf>> = Vec::new();

    for job_file_arg in &args {
        let job_file_path = Path::new(job_file_arg);

        // Load settings from the same directory as the job file.
        let settings = match config::load_settings_for_job(job_file_path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("ERROR: Failed to load settings for {job_file_arg}: {e}");
                return ExitCode::FAILURE;
            }
        };

        let job_file = match config::load_job_file(job_file_path) {
            Ok(jf) => jf,
            Err(e) => {
                eprintln!("ERROR: {job_file_arg}: {e}");
                return ExitCode::FAILURE;
            }
        };

        let job_dir = config::job_dir(job_file_path);

        for job in &job_file.jobs {
            let merged = MergedConfig::new(&settings, job);

            log_dirs.push(
                merged
                    .log_dir
                    .as_ref()
                    .map(|d| config::resolve_path(&job_dir, &d.to_string_lossy())),
            );

            job_configs.push(JobConfig {
                input_path: config::resolve_path(&job_dir, &job.input),
                output_dir: config::resolve_path(&job_dir, &job.output),
                pages: merged.pages.clone(),
                extractor: merged.extractor_config(),
                parallel_workers: merged.parallel_workers,
                write_manifest: merged.write_manifest,
            });
        }
    }

    // Each job gets its own dispatcher (and log file when log_dir is set).
    let mut job_index = 0;
    let results = run_all_jobs(&job_configs, |job| {
        let log_file = log_dirs[job_index].as_deref().map(run_log_path);
        job_index += 1;
        let dispatch = build_dispatch(log_file.as_deref())?;
        Ok(RunContext::new(dispatch, &job.input_path))
    });

    let mut has_error = false;
    for (i, result) in results.iter().enumerate() {
        match result {
            Ok(job_result) => {
                eprintln!(
                    "OK: {} -> {} ({} images, {} fallbacks)",
                    job_result.input_path.display(),
                    job_result.output_dir.display(),
                    job_result.images_processed,
                    job_result.fallbacks
                );
            }
            Err(e) => {
                eprintln!(
                    "ERROR: {} -> {}: {e}",
                    job_configs[i].input_path.display(),
                    job_configs[i].output_dir.display()
                );
                has_error = true;
            }
        }
    }

    if has_error {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
