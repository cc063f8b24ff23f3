pub mod job;
pub mod merged;
pub mod settings;

use std::path::{Path, PathBuf};

use job::JobFile;
use settings::Settings;

/// ジョブファイルのパスからsettings.yamlを自動検出して読み込む。
///
/// ジョブファイルと同じディレクトリに `settings.yaml` が存在すれば読み込み、
/// 存在しなければデフォルト設定を返す。
pub fn load_settings_for_job(job_file_path: &Path) -> crate::error::Result<Settings> {
    let settings_path = job_dir(job_file_path).join("settings.yaml");

    if settings_path.exists() {
        Settings::from_file(&settings_path)
    } else {
        Ok(Settings::default())
    }
}

/// ジョブファイルを読み込んでパースする
pub fn load_job_file(job_file_path: &Path) -> crate::error::Result<JobFile> {
    let content = std::fs::read_to_string(job_file_path).map_err(|e| {
        crate::error::ExtractError::config(format!(
            "Failed to read job file {}: {e}",
            job_file_path.display()
        ))
    })?;
    JobFile::from_yaml(&content)
}

/// 相対パスの基準となるディレクトリ（ジョブファイルの親）
pub fn job_dir(job_file_path: &Path) -> PathBuf {
    match job_file_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Resolve a potentially relative path against a base directory.
/// If the path is already absolute, return it as-is.
pub fn resolve_path(base_dir: &Path, path: &str) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base_dir.join(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_dir_of_bare_file_name_is_cwd() {
        assert_eq!(job_dir(Path::new("jobs.yaml")), PathBuf::from("."));
        assert_eq!(job_dir(Path::new("a/jobs.yaml")), PathBuf::from("a"));
    }

    #[test]
    fn test_resolve_path_keeps_absolute() {
        assert_eq!(
            resolve_path(Path::new("/base"), "/abs/out"),
            PathBuf::from("/abs/out")
        );
        assert_eq!(
            resolve_path(Path::new("/base"), "rel/out"),
            PathBuf::from("/base/rel/out")
        );
    }
}
