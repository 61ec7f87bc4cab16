//! Spoken summaries.

use std::process::{Command, Stdio};

use anyhow::{anyhow, Context, Result};

use crate::config::VoiceSettings;

/// Text-to-speech engine. `speak` blocks until the utterance has finished.
pub trait Speaker: Send {
    fn speak(&mut self, text: &str) -> Result<()>;
}

/// Speaks through a command-line engine such as `espeak-ng` or `espeak`.
#[derive(Clone, Debug)]
pub struct CommandSpeaker {
    program: String,
    rate: u32,
    voice: Option<String>,
}

impl CommandSpeaker {
    pub fn new(settings: &VoiceSettings) -> Self {
        Self {
            program: settings.command.clone(),
            rate: settings.rate,
            voice: settings.voice.clone(),
        }
    }

    fn command(&self, text: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-s").arg(self.rate.to_string());
        if let Some(voice) = &self.voice {
            cmd.arg("-v").arg(voice);
        }
        cmd.arg("--").arg(text);
        cmd.stdin(Stdio::null()).stdout(Stdio::null());
        cmd
    }
}

impl Speaker for CommandSpeaker {
    fn speak(&mut self, text: &str) -> Result<()> {
        log::debug!("speaking: {}", text);
        let output = self
            .command(text)
            .output()
            .with_context(|| format!("failed to start speech engine '{}'", self.program))?;
        if !output.status.success() {
            return Err(anyhow!(
                "speech engine '{}' exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(())
    }
}

/// Speaker that only logs.
#[derive(Clone, Copy, Debug, Default)]
pub struct SilentSpeaker;

impl Speaker for SilentSpeaker {
    fn speak(&mut self, text: &str) -> Result<()> {
        log::debug!("voice disabled, not speaking: {}", text);
        Ok(())
    }
}
