//! ConsoleTarget - writes records to stdout

use std::io::{self, Write};

use tracing::{instrument, warn};
use validator::Validate;

use contracts::{ConsoleConfig, ContractError, LogRecord, Target};

use super::{check_timestamp_format, readable};

/// Target that prints one header line per record, followed by the
/// indented data if present
pub struct ConsoleTarget {
    name: String,
    config: ConsoleConfig,
    out: Box<dyn Write + Send>,
}

impl ConsoleTarget {
    /// Create a console target writing to stdout
    pub fn build(name: impl Into<String>, config: ConsoleConfig) -> Result<Self, ContractError> {
        Self::with_writer(name, config, Box::new(io::stdout()))
    }

    /// Create a console target writing to `out`
    pub fn with_writer(
        name: impl Into<String>,
        config: ConsoleConfig,
        out: Box<dyn Write + Send>,
    ) -> Result<Self, ContractError> {
        let name = name.into();
        config.validate()?;
        check_timestamp_format(&name, &config.timestamp)?;
        Ok(Self { name, config, out })
    }

    fn format(&self, record: &LogRecord) -> String {
        let mut line = format!(
            "{} [{}][{}][{}]: {}",
            record.time.format(&self.config.timestamp),
            record.component,
            record.instance,
            record.level,
            record.title
        );
        if let Some(data) = &record.data {
            line.push('\n');
            line.push_str(&self.indented(&readable(data)));
        }
        line
    }

    fn indented(&self, text: &str) -> String {
        let prefix = &self.config.indentation;
        let mut out = String::with_capacity(text.len() + prefix.len());
        for (i, line) in text.lines().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(prefix);
            out.push_str(line);
        }
        out
    }
}

impl Target for ConsoleTarget {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "console_target_log", skip_all, fields(target_name = %self.name))]
    async fn log(&mut self, record: &LogRecord) -> Result<(), ContractError> {
        let text = self.format(record);
        if let Err(e) = writeln!(self.out, "{text}").and_then(|()| self.out.flush()) {
            // Best effort, never suspended
            warn!(target_name = %self.name, error = %e, "Failed to write log to console");
        }
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), ContractError> {
        let _ = self.out.flush();
        Ok(())
    }
}
