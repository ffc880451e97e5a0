use std::fmt;
use std::path::{Path, PathBuf};

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Engine stage that produced an encode failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    AudioEncode,
    FrameExtract,
    Materialize,
    LoopTrim,
    Mux,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::AudioEncode => "audio encode",
            Stage::FrameExtract => "frame extract",
            Stage::Materialize => "materialize",
            Stage::LoopTrim => "loop-trim",
            Stage::Mux => "mux",
        };
        f.write_str(name)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("unknown effect `{0}`")]
    UnknownEffect(String),

    #[error("io error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("probe error: {0}")]
    Probe(String),

    #[error("{stage} stage failed: {message}")]
    Encode { stage: Stage, message: String },

    #[error("mux error: {0}")]
    Mux(String),

    #[error("audio acquisition failed: {0}")]
    Acquire(String),
}

impl PipelineError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn encode(stage: Stage, msg: impl Into<String>) -> Self {
        Self::Encode {
            stage,
            message: msg.into(),
        }
    }
}

/// Fails with `Io` unless `path` names an existing regular file.
pub fn ensure_input(path: &Path) -> PipelineResult<()> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(PipelineError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a regular file"),
        )),
        Err(e) => Err(PipelineError::io(path, e)),
    }
}
