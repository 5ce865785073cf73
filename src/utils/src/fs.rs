use std::path::{Path, PathBuf};

/// BASE_DIR_NAME is the directory created under the resolved home to hold meta and data files.
pub const BASE_DIR_NAME: &'static str = ".influxdb";

/// HOME_ENV overrides the home directory used to derive the base directory.
pub const HOME_ENV: &'static str = "INFLUXD_HOME";

/// base_dir_from resolves the base directory from explicit candidates, in order:
/// the user's profile directory, the environment override, then the working
/// directory. Empty candidates are skipped.
pub fn base_dir_from(
    profile_home: Option<&Path>,
    env_home: Option<&Path>,
    cwd: &Path,
) -> PathBuf {
    fn non_empty(p: Option<&Path>) -> Option<&Path> {
        p.filter(|p| !p.as_os_str().is_empty())
    }

    let home = non_empty(profile_home)
        .or_else(|| non_empty(env_home))
        .unwrap_or(cwd);

    home.join(BASE_DIR_NAME)
}

/// base_dir gathers the candidates from the process environment and resolves
/// them with [`base_dir_from`].
pub fn base_dir() -> anyhow::Result<PathBuf> {
    let profile = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from);
    let env_home = std::env::var_os(HOME_ENV).map(PathBuf::from);
    let cwd = std::env::current_dir()
        .map_err(|e| anyhow!("unable to resolve working directory: {}", e))?;

    Ok(base_dir_from(
        profile.as_deref(),
        env_home.as_deref(),
        cwd.as_path(),
    ))
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use crate::fs::base_dir_from;

    #[test]
    fn test_base_dir_fallbacks() {
        let cwd = Path::new("/work");

        let dir = base_dir_from(Some(Path::new("/home/u")), Some(Path::new("/env")), cwd);
        assert_eq!(dir, PathBuf::from("/home/u/.influxdb"));

        let dir = base_dir_from(None, Some(Path::new("/env")), cwd);
        assert_eq!(dir, PathBuf::from("/env/.influxdb"));

        let dir = base_dir_from(Some(Path::new("")), None, cwd);
        assert_eq!(dir, PathBuf::from("/work/.influxdb"));
    }
}
