use crate::config::TargetConfig;
use crate::errors::{PipeProbeError, Result};

/// Positional arguments after flag parsing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    pub pipe_path: Option<String>,
    pub request_path: Option<String>,
}

impl Invocation {
    /// Map `[]`, `[path]` or `[pipe, path]`; anything longer is a usage error
    pub fn from_positionals(args: &[String]) -> Result<Self> {
        match args {
            [] => Ok(Self::default()),
            [request_path] => Ok(Self {
                pipe_path: None,
                request_path: Some(request_path.clone()),
            }),
            [pipe_path, request_path] => Ok(Self {
                pipe_path: Some(pipe_path.clone()),
                request_path: Some(request_path.clone()),
            }),
            _ => Err(PipeProbeError::usage(format!(
                "expected at most 2 positional arguments ([PIPE] [PATH]), got {}: {:?}",
                args.len(),
                args
            ))),
        }
    }

    /// Overlay the given positionals on `target`
    pub fn apply(self, target: &mut TargetConfig) {
        if let Some(pipe_path) = self.pipe_path {
            target.pipe_path = pipe_path;
        }
        if let Some(request_path) = self.request_path {
            target.request_path = request_path;
        }
    }
}
