use serde::Serialize;

use crate::error::AppResult;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum OutputMode {
    Text,
    Json,
}

/// Chooses between a human line and pretty JSON for command results.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    mode: OutputMode,
}

impl Output {
    pub fn new(json: bool) -> Self {
        let mode = if json {
            OutputMode::Json
        } else {
            OutputMode::Text
        };
        Self { mode }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    pub fn emit<T: Serialize>(&self, text: &str, value: &T) -> AppResult<()> {
        println!("{}", self.render(text, value)?);
        Ok(())
    }

    pub fn render<T: Serialize>(&self, text: &str, value: &T) -> AppResult<String> {
        match self.mode {
            OutputMode::Text => Ok(text.to_string()),
            OutputMode::Json => Ok(serde_json::to_string_pretty(value)?),
        }
    }
}
