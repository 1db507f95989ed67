//! Entry point shared by the demo binaries.

use std::path::Path;
use std::process::ExitCode;

use crate::error::VlkResult;

use super::update_loop::{run_update_loop, Updatable};

const FALLBACK_TITLE: &str = "Windowed Application";

/// Initialize `env_logger`: `debug` in debug builds and `info` otherwise,
/// overridable through `RUST_LOG`.
pub fn init_logging() {
    let default_filter = if cfg!(debug_assertions) { "debug" } else { "info" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .try_init();
}

/// Window title derived from an executable path: the file stem, or a
/// fallback when there is none.
pub fn title_from_path(path: Option<&Path>) -> String {
    path.and_then(Path::file_stem)
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| FALLBACK_TITLE.to_string())
}

/// The title for the running executable.
pub fn executable_title() -> String {
    let exe = std::env::current_exe().ok();
    title_from_path(exe.as_deref())
}

/// Set up logging, build the app with the executable's title and run it.
pub fn app_main<A, F>(make_app: F) -> ExitCode
where
    A: Updatable,
    F: FnOnce(&str) -> VlkResult<A>,
{
    init_logging();
    let title = executable_title();

    let result = make_app(&title).and_then(|mut app| run_update_loop(&mut app));
    match result {
        Ok(()) => {
            log::info!("Exiting without errors");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_from_path() {
        assert_eq!(title_from_path(Some(Path::new("/usr/bin/particles"))), "particles");
        assert_eq!(title_from_path(Some(Path::new("C:/demos/objs.exe"))), "objs");
        assert_eq!(title_from_path(None), FALLBACK_TITLE);
        assert_eq!(title_from_path(Some(Path::new("/"))), FALLBACK_TITLE);
    }
}
