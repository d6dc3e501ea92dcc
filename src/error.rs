pub type FoveateResult<T> = Result<T, FoveateError>;

/// Pipeline stage a fatal error originated from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Gaze,
    Composite,
    Segment,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Stage::Gaze => "gaze",
            Stage::Composite => "composite",
            Stage::Segment => "segment",
        })
    }
}

#[derive(thiserror::Error, Debug)]
pub enum FoveateError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("shape mismatch: {what} is {got_w}x{got_h}, expected {want_w}x{want_h}")]
    ShapeMismatch {
        what: &'static str,
        want_w: u32,
        want_h: u32,
        got_w: u32,
        got_h: u32,
    },

    #[error("empty candidate set: a {width}x{height} frame leaves no gaze grid candidates")]
    EmptyCandidateSet { width: u32, height: u32 },

    #[error("encode error: {0}")]
    Encode(String),

    #[error("source error: {0}")]
    Source(String),

    #[error("{stage} stage failed at frame {frame}: {source}")]
    Stage {
        stage: Stage,
        frame: u64,
        #[source]
        source: Box<FoveateError>,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FoveateError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    pub fn decoder(msg: impl Into<String>) -> Self {
        Self::Source(msg.into())
    }

    pub fn at_stage(self, stage: Stage, frame: u64) -> Self {
        Self::Stage {
            stage,
            frame,
            source: Box::new(self),
        }
    }
}
