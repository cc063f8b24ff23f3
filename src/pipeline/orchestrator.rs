// 全ジョブ実行

use crate::logging::RunContext;
use crate::pipeline::job_runner::{JobConfig, JobResult, run_job};

/// Run multiple jobs, collecting results.
/// One job failure does NOT prevent other jobs from running.
///
/// `context_for` supplies the logging context of each job.
pub fn run_all_jobs<F>(jobs: &[JobConfig], mut context_for: F) -> Vec<crate::error::Result<JobResult>>
where
    F: FnMut(&JobConfig) -> crate::error::Result<RunContext>,
{
    jobs.iter()
        .map(|job| {
            let ctx = context_for(job)?;
            let result = run_job(job, &ctx);
            if let Err(e) = &result {
                ctx.in_scope(|| tracing::error!(error = %e, "job failed"));
            }
            result
        })
        .collect()
}
