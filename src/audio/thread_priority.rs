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

use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};
use tracing::{info, warn};

/// Default priority for the output thread when neither config nor WAVEMIX_THREAD_PRIORITY set one.
const DEFAULT_OUTPUT_THREAD_PRIORITY: u8 = 70;

/// Resolves the output thread priority (0-99). WAVEMIX_THREAD_PRIORITY wins over the configured
/// value; out of range values are ignored.
pub fn output_thread_priority(configured: Option<u8>) -> u8 {
    std::env::var("WAVEMIX_THREAD_PRIORITY")
        .ok()
        .and_then(|v| v.parse::<u8>().ok())
        .filter(|n| *n < 100)
        .or(configured.filter(|n| *n < 100))
        .unwrap_or(DEFAULT_OUTPUT_THREAD_PRIORITY)
}

pub(crate) fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| {
            v == "1"
                || v.eq_ignore_ascii_case("true")
                || v.eq_ignore_ascii_case("yes")
                || v.eq_ignore_ascii_case("on")
        })
        .unwrap_or(false)
}

/// Returns whether we should attempt RT (SCHED_FIFO) scheduling for the output thread.
/// WAVEMIX_DISABLE_RT_AUDIO=1 turns it off even when configured.
pub fn rt_audio_enabled(configured: bool) -> bool {
    configured && !env_flag("WAVEMIX_DISABLE_RT_AUDIO")
}

/// Raises the calling thread's priority. Failures are logged and otherwise ignored: the output
/// thread still works at normal priority. Returns whether the cross-platform priority was applied.
pub fn configure_output_thread_priority(priority: u8, rt_audio: bool) -> bool {
    let value = match ThreadPriorityValue::try_from(priority) {
        Ok(value) => value,
        Err(e) => {
            warn!(priority, error = %e, "Invalid output thread priority");
            return false;
        }
    };
    let tp = ThreadPriority::Crossplatform(value);
    let applied = match set_current_thread_priority(tp) {
        Ok(()) => true,
        Err(e) => {
            warn!(priority, error = ?e, "Failed to raise output thread priority");
            false
        }
    };

    #[cfg(unix)]
    if rt_audio {
        use thread_priority::unix::{
            set_thread_priority_and_policy, thread_native_id, RealtimeThreadSchedulePolicy,
            ThreadSchedulePolicy,
        };
        let tid = thread_native_id();
        match set_thread_priority_and_policy(
            tid,
            tp,
            ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo),
        ) {
            Ok(()) => {
                info!("Enabled RT SCHED_FIFO for output thread");
            }
            Err(e) => {
                warn!(
                    error = ?e,
                    "Failed to set RT SCHED_FIFO for output thread"
                );
            }
        }
    }
    #[cfg(not(unix))]
    let _ = rt_audio;

    applied
}
