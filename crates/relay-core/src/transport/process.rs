//! Backend process construction
//!
//! Builds the command used to launch the backend consistently across
//! platforms, hiding the console window on Windows.

use std::process::Stdio;

use tokio::process::Command;

use crate::config::BackendConfig;

/// Windows creation flag to hide the console window
#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x08000000;

#[cfg(windows)]
fn hide_console_window(cmd: &mut Command) {
    cmd.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(windows))]
fn hide_console_window(_cmd: &mut Command) {
    // No-op on non-Windows platforms
}

/// Create the backend command with all three standard streams piped
///
/// The child is killed if its handle is dropped, so a leaked connection can
/// never leave an orphaned backend behind.
pub(crate) fn backend_command(config: &BackendConfig) -> Command {
    let mut cmd = Command::new(&config.command);
    cmd.args(&config.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(dir) = &config.working_dir {
        cmd.current_dir(dir);
    }

    hide_console_window(&mut cmd);
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_command_program_and_args() {
        let config = BackendConfig::default();
        let cmd = backend_command(&config);
        let std_cmd = cmd.as_std();

        assert_eq!(std_cmd.get_program(), "codebuff");
        let args: Vec<_> = std_cmd.get_args().collect();
        assert_eq!(args, ["ide", "--stdio"]);
        assert_eq!(std_cmd.get_current_dir(), None);
    }

    #[test]
    fn test_backend_command_working_dir() {
        let mut config = BackendConfig::new("cat", vec![]);
        config.working_dir = Some(std::env::temp_dir());

        let cmd = backend_command(&config);
        assert_eq!(cmd.as_std().get_current_dir(), Some(std::env::temp_dir().as_path()));
    }
}
