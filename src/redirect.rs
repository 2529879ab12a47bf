/// What a file descriptor should be connected to.
#[derive(Debug, Clone)]
pub enum RedirectTarget {
    /// Write to file (truncate)
    File(String),
    /// Write to file (append)
    FileAppend(String),
    /// Read from file
    FileRead(String),
    /// Duplicate another fd (e.g., 2>&1)
    Fd(i32),
    /// Feed a string as stdin
    HereString(String),
}

/// A single I/O redirection instruction.
#[derive(Debug, Clone)]
pub struct Redirection {
    pub fd: i32,
    pub target: RedirectTarget,
}

/// Check if a path refers to a null device (cross-platform).
pub fn is_null_device(path: &str) -> bool {
    if cfg!(windows) {
        path.eq_ignore_ascii_case("NUL") || path.eq_ignore_ascii_case("/dev/null")
    } else {
        path == "/dev/null"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_device_detection() {
        assert!(is_null_device("/dev/null"));
        if cfg!(windows) {
            assert!(is_null_device("NUL"));
            assert!(is_null_device("nul"));
        }
    }
}
