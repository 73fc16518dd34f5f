// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

/// Errors raised while reading a RIFF/WAVE header. Neither is fatal to the
/// pipeline: the caller simply gets no stream.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("Malformed container: {0}")]
    Malformed(String),

    #[error("Unsupported format: {0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContainerError {
    /// Maps a short read while walking the header onto a malformed container.
    pub(crate) fn from_header_io(err: std::io::Error, what: &str) -> ContainerError {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            ContainerError::Malformed(format!("truncated {}", what))
        } else {
            ContainerError::Io(err)
        }
    }
}

/// Errors raised by a sample decoder mid-stream. The mixer drops the
/// offending stream and keeps going.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Decode fault at block {block}: {reason}")]
    Fault { block: u64, reason: String },

    #[error("Output buffer holds {available} samples, {required} required")]
    OutputTooSmall { available: usize, required: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors reported by an audio device backend.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Unable to open audio device: {0}")]
    Open(String),

    #[error("Audio stream failed: {0}")]
    Stream(String),

    #[error("Unknown request {0}")]
    UnknownRequest(u64),

    #[error("Device is closed")]
    Closed,
}

/// Errors that stop the output pipeline as a whole.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(#[from] DeviceError),

    #[error("Unable to allocate {frames} frame mix buffer")]
    ResourceExhausted { frames: usize },

    #[error("Buffer slot {0} is already submitted")]
    SlotBusy(usize),

    #[error("Unable to start the output thread: {0}")]
    ThreadSpawn(std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_eof_is_malformed() {
        let err = ContainerError::from_header_io(
            std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof"),
            "fmt chunk",
        );
        assert!(matches!(err, ContainerError::Malformed(ref m) if m == "truncated fmt chunk"));
    }

    #[test]
    fn test_header_other_io_is_io() {
        let err = ContainerError::from_header_io(
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope"),
            "fmt chunk",
        );
        assert!(matches!(err, ContainerError::Io(_)));
    }

    #[test]
    fn test_pipeline_error_display() {
        let err = PipelineError::from(DeviceError::Open("no such card".to_string()));
        assert!(err.to_string().contains("no such card"));
        assert!(err.to_string().contains("unavailable"));
    }
}
