//! Chitu command vocabulary
//!
//! Fixed commands are constants; commands carrying arguments are built by
//! the functions below.

/// Initialize the storage card / USB image
pub const INIT_STORAGE: &str = "M21";
/// Report firmware identity
pub const FIRMWARE_INFO: &str = "M115";
/// Report storage print status
pub const STORAGE_STATUS: &str = "M27";
/// Report current position
pub const REPORT_POSITION: &str = "M114";
/// Pause the running job
pub const PAUSE: &str = "M25";
/// Resume a paused job
pub const RESUME: &str = "M24";
/// Stop the running job
pub const STOP: &str = "M33";
/// Home the Z axis
pub const HOME_Z: &str = "G28 Z0";
/// Switch to relative positioning
pub const RELATIVE_MODE: &str = "G91";
/// Switch to absolute positioning
pub const ABSOLUTE_MODE: &str = "G90";
/// Reboot the board
pub const REBOOT: &str = "M999";
/// Open a file on the printer storage
pub const SELECT_FILE: &str = "M23";

/// `M23 <filename>`
pub fn select_file(filename: &str) -> String {
    format!("{} {}", SELECT_FILE, filename)
}

/// `<start command> '<filename>'`
pub fn start_print(start_command: &str, filename: &str) -> String {
    format!("{} '{}'", start_command, filename)
}

/// Relative Z move wrapped in positioning mode switches
pub fn relative_z_move(distance: f64, feed_rate: u32) -> [String; 3] {
    [
        RELATIVE_MODE.to_string(),
        format!("G1 Z{} F{}", distance, feed_rate),
        ABSOLUTE_MODE.to_string(),
    ]
}

/// First whitespace-separated token of a command line
pub fn command_word(command: &str) -> &str {
    command.split_whitespace().next().unwrap_or("")
}

/// Commands that touch the printer storage get a longer response timeout
pub fn is_slow_command(command: &str, start_command: &str) -> bool {
    let word = command_word(command);
    word.eq_ignore_ascii_case(SELECT_FILE) || word.eq_ignore_ascii_case(command_word(start_command))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argument_commands() {
        assert_eq!(select_file("job.ctb"), "M23 job.ctb");
        assert_eq!(start_print("M6030", "job.ctb"), "M6030 'job.ctb'");
        assert_eq!(
            relative_z_move(1.5, 600),
            ["G91".to_string(), "G1 Z1.5 F600".to_string(), "G90".to_string()]
        );
        assert_eq!(relative_z_move(-10.0, 300)[1], "G1 Z-10 F300");
    }

    #[test]
    fn test_slow_commands() {
        assert!(is_slow_command("M23 job.ctb", "M6030"));
        assert!(is_slow_command("M6030 'job.ctb'", "M6030"));
        assert!(is_slow_command("m23 job.ctb", "M6030"));
        assert!(!is_slow_command("M27", "M6030"));
        assert!(!is_slow_command("M230", "M6030"));
        assert!(!is_slow_command("", "M6030"));
    }

    #[test]
    fn test_command_word() {
        assert_eq!(command_word("  G28 Z0"), "G28");
        assert_eq!(command_word(""), "");
    }
}
