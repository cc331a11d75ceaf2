//! Domain error types.

/// Top-level error type for stagetrader.
#[derive(Debug, thiserror::Error)]
pub enum StageTraderError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("no tradable instrument for the {stage} stage")]
    EmptyCatalog { stage: String },

    #[error("indicator source unavailable for {symbol}: {reason}")]
    IndicatorUnavailable { symbol: String, reason: String },

    #[error("insufficient data for {symbol}: have {bars} bars, need {minimum}")]
    InsufficientData {
        symbol: String,
        bars: usize,
        minimum: usize,
    },

    #[error("market data unavailable for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    #[error("{operation} timed out")]
    Timeout { operation: String },

    #[error("order on {symbol} rejected: {reason}")]
    OrderRejected { symbol: String, reason: String },

    #[error("stop-loss modification of position {position_id} rejected: {reason}")]
    ModifyRejected { position_id: u64, reason: String },

    #[error("close of position {position_id} rejected: {reason}")]
    CloseRejected { position_id: u64, reason: String },

    #[error("engine faulted: {reason}")]
    Faulted { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StageTraderError {
    /// Errors that only abandon the current tick; the next tick retries.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StageTraderError::InsufficientData { .. }
                | StageTraderError::DataUnavailable { .. }
                | StageTraderError::Timeout { .. }
        )
    }

    /// Errors that prevent the engine from starting or continuing.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            StageTraderError::ConfigParse { .. }
                | StageTraderError::ConfigMissing { .. }
                | StageTraderError::ConfigInvalid { .. }
                | StageTraderError::EmptyCatalog { .. }
                | StageTraderError::IndicatorUnavailable { .. }
        )
    }
}

impl From<&StageTraderError> for std::process::ExitCode {
    fn from(err: &StageTraderError) -> Self {
        let code: u8 = match err {
            StageTraderError::Io(_) => 1,
            StageTraderError::ConfigParse { .. }
            | StageTraderError::ConfigMissing { .. }
            | StageTraderError::ConfigInvalid { .. } => 2,
            StageTraderError::EmptyCatalog { .. }
            | StageTraderError::IndicatorUnavailable { .. }
            | StageTraderError::Faulted { .. } => 3,
            StageTraderError::InsufficientData { .. }
            | StageTraderError::DataUnavailable { .. }
            | StageTraderError::Timeout { .. } => 4,
            StageTraderError::OrderRejected { .. }
            | StageTraderError::ModifyRejected { .. }
            | StageTraderError::CloseRejected { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
