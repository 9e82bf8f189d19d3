//! Device client configuration

/// How to reach a device through a local program
#[derive(Debug, Clone)]
pub struct DeviceClientConfig {
    /// Program to spawn for every command (for example `ssh`)
    pub program: String,

    /// Arguments placed before the device command
    pub args: Vec<String>,

    /// Exit codes meaning the program could not reach the device at all.
    /// `ssh` reports connection problems as 255.
    pub connection_failure_codes: Vec<i32>,
}

impl Default for DeviceClientConfig {
    fn default() -> Self {
        Self {
            program: "ssh".to_string(),
            args: Vec::new(),
            connection_failure_codes: vec![255],
        }
    }
}

impl DeviceClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_connection_failure_codes(mut self, codes: Vec<i32>) -> Self {
        self.connection_failure_codes = codes;
        self
    }

    /// Whether an exit code means the transport failed
    pub fn is_connection_failure(&self, exit_code: i32) -> bool {
        self.connection_failure_codes.contains(&exit_code)
    }
}
