//! Kernel tunables for the syscall layer.

/// Largest single burst handed to the console driver by `write(1, ..)`.
pub const CONSOLE_CHUNK: usize = 256;

/// Descriptor table capacity per process, reserved console slots included.
pub const MAX_OPEN_FILES: usize = 128;

/// Longest path accepted by `create`, `remove` and `open`, NUL excluded.
pub const MAX_PATH_LEN: usize = 511;

/// Longest command line accepted by `exec`, NUL excluded.
pub const MAX_CMDLINE_LEN: usize = 4095;

/// Runtime configuration of the syscall layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    /// Console output burst size in bytes (at least 1).
    pub console_chunk: usize,
    /// Descriptor table capacity.
    pub max_open_files: usize,
    /// Path length limit.
    pub max_path_len: usize,
    /// Command line length limit.
    pub max_cmdline_len: usize,
}

impl KernelConfig {
    pub const fn new() -> Self {
        Self {
            console_chunk: CONSOLE_CHUNK,
            max_open_files: MAX_OPEN_FILES,
            max_path_len: MAX_PATH_LEN,
            max_cmdline_len: MAX_CMDLINE_LEN,
        }
    }

    /// Set the console burst size. Zero is raised to one.
    pub const fn with_console_chunk(mut self, bytes: usize) -> Self {
        self.console_chunk = if bytes == 0 { 1 } else { bytes };
        self
    }

    pub const fn with_max_open_files(mut self, files: usize) -> Self {
        self.max_open_files = files;
        self
    }

    pub const fn with_max_path_len(mut self, len: usize) -> Self {
        self.max_path_len = len;
        self
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::new()
    }
}
