use std::fmt;
use std::path::PathBuf;

use crate::operation::Operation;

/// Which artifact of a cell an invocation compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArtifactKind {
    /// Directive lines of the snippet only.
    Baseline,
    /// Snippet plus generated workload.
    Full,
}

impl ArtifactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Baseline => "baseline",
            ArtifactKind::Full => "full",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed failure kinds surfaced by the benchmark pipeline.
///
/// Everything travels as `anyhow::Error`; callers that need to tell the kinds
/// apart use `err.downcast_ref::<BenchError>()`.
#[derive(Debug)]
pub enum BenchError {
    UnknownOperation {
        name: String,
    },
    MalformedCatalogue {
        path: PathBuf,
        reason: String,
    },
    InvalidConfig {
        reason: String,
    },
    BuildFailed {
        operation: Operation,
        sut: String,
        size: usize,
        kind: ArtifactKind,
        command: String,
        status: String,
        stdout: String,
        stderr: String,
    },
    Spawn {
        program: String,
        source: std::io::Error,
    },
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl BenchError {
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        BenchError::InvalidConfig { reason: reason.into() }
    }

    pub fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        BenchError::MalformedCatalogue {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BenchError::Io {
            path: path.into(),
            source,
        }
    }

    /// Configuration errors are raised before any measurement starts.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            BenchError::UnknownOperation { .. } | BenchError::MalformedCatalogue { .. } | BenchError::InvalidConfig { .. }
        )
    }
}

impl fmt::Display for BenchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BenchError::UnknownOperation { name } => write!(f, "unknown operation '{}'", name),
            BenchError::MalformedCatalogue { path, reason } => {
                write!(f, "malformed catalogue at {}: {}", path.display(), reason)
            }
            BenchError::InvalidConfig { reason } => write!(f, "invalid configuration: {}", reason),
            BenchError::BuildFailed {
                operation,
                sut,
                size,
                kind,
                command,
                status,
                stdout,
                stderr,
            } => {
                write!(
                    f,
                    "build failed for {}/{} at N={} ({}): `{}` {}",
                    operation, sut, size, kind, command, status
                )?;
                if !stdout.trim().is_empty() {
                    write!(f, "\n--- stdout ---\n{}", stdout.trim_end())?;
                }
                if !stderr.trim().is_empty() {
                    write!(f, "\n--- stderr ---\n{}", stderr.trim_end())?;
                }
                Ok(())
            }
            BenchError::Spawn { program, source } => write!(f, "failed to spawn '{}': {}", program, source),
            BenchError::Io { path, source } => write!(f, "I/O error at {}: {}", path.display(), source),
        }
    }
}

impl std::error::Error for BenchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BenchError::Spawn { source, .. } | BenchError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_failure_display_includes_captured_output() {
        let err = BenchError::BuildFailed {
            operation: Operation::At,
            sut: "libX".to_string(),
            size: 3,
            kind: ArtifactKind::Full,
            command: "c++ -c at_libX_3_full.cpp".to_string(),
            status: "exited with code 1".to_string(),
            stdout: String::new(),
            stderr: "error: no member named 'at'\n".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("at/libX at N=3 (full)"));
        assert!(text.contains("--- stderr ---\nerror: no member named 'at'"));
        assert!(!text.contains("--- stdout ---"));
    }

    #[test]
    fn configuration_kinds() {
        assert!(BenchError::invalid_config("repetitions must be >= 1").is_configuration());
        assert!(
            BenchError::UnknownOperation {
                name: "zip".to_string()
            }
            .is_configuration()
        );
        let io = BenchError::io("results/x.csv", std::io::Error::other("disk full"));
        assert!(!io.is_configuration());
        assert!(io.to_string().contains("results/x.csv"));
    }
}
