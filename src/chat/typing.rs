//! Character-by-character reveal of bot replies
//!
//! The animator advances a message's `display_text` through strictly longer
//! prefixes of its `text`. Every step looks the message up again through a
//! [`RevealTarget`]; when the message is gone (session switched, messages
//! cleared) the animation ends quietly. A [`CancellationToken`] stops it
//! early from the outside.

use crate::chat::sync::{SyncJob, SyncQueue};
use crate::chat::types::{AnimationState, MessageUpdate};
use crate::config::ChatConfig;

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Where revealed text is written.
pub trait RevealTarget: Send + Sync {
    /// Sets the revealed prefix of `message_id`. Returns `false` when the
    /// message no longer exists.
    fn reveal(&self, message_id: &str, shown: &str) -> bool;

    /// Marks `message_id` fully revealed. Returns `false` when the message
    /// no longer exists.
    fn complete(&self, message_id: &str) -> bool;
}

/// One message to animate.
#[derive(Debug, Clone)]
pub struct AnimationJob {
    /// Owning session
    pub session_id: String,
    /// Target message
    pub message_id: String,
    /// Full text to reveal
    pub text: String,
}

/// How an animation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationOutcome {
    /// Every character was revealed
    Completed,
    /// The cancellation token fired
    Cancelled,
    /// The message disappeared mid-animation
    Vanished,
}

/// Timing and sync settings for the reveal.
#[derive(Debug, Clone, Copy)]
pub struct TypingAnimator {
    per_char: Duration,
    max_total: Duration,
    sync_stride: usize,
}

impl Default for TypingAnimator {
    fn default() -> Self {
        Self::from_chat_config(&ChatConfig::default())
    }
}

impl TypingAnimator {
    /// Creates an animator
    ///
    /// `sync_stride` is clamped to at least 1.
    pub fn new(per_char: Duration, max_total: Duration, sync_stride: usize) -> Self {
        Self {
            per_char,
            max_total,
            sync_stride: sync_stride.max(1),
        }
    }

    /// Reads `typing_speed_ms`, `max_typing_ms` and `sync_stride`.
    pub fn from_chat_config(config: &ChatConfig) -> Self {
        Self::new(
            Duration::from_millis(config.typing_speed_ms),
            Duration::from_millis(config.max_typing_ms),
            config.sync_stride,
        )
    }

    /// Total reveal time for a text of `char_count` characters.
    ///
    /// # Examples
    ///
    /// ```
    /// use iamguard::chat::typing::TypingAnimator;
    /// use std::time::Duration;
    ///
    /// let animator = TypingAnimator::default();
    /// assert_eq!(animator.total_duration(50), Duration::from_millis(500));
    /// assert_eq!(animator.total_duration(5000), Duration::from_millis(2000));
    /// ```
    pub fn total_duration(&self, char_count: usize) -> Duration {
        let count = u32::try_from(char_count).unwrap_or(u32::MAX);
        self.per_char.saturating_mul(count).min(self.max_total)
    }

    /// Delay between two revealed characters.
    pub fn char_interval(&self, char_count: usize) -> Duration {
        if char_count == 0 {
            return Duration::ZERO;
        }
        let count = u32::try_from(char_count).unwrap_or(u32::MAX);
        self.total_duration(char_count) / count
    }

    /// Reveals `job.text` into `target`
    ///
    /// With a sync queue, progress is pushed at every `sync_stride`-th
    /// character and on the last one, followed by a final `complete` update.
    pub async fn animate(
        &self,
        target: &dyn RevealTarget,
        job: &AnimationJob,
        cancel: &CancellationToken,
        sync: Option<&SyncQueue>,
    ) -> AnimationOutcome {
        let ends: Vec<usize> = job
            .text
            .char_indices()
            .map(|(idx, c)| idx + c.len_utf8())
            .collect();
        let interval = self.char_interval(ends.len());
        let total = self.total_duration(ends.len());
        let count = u32::try_from(ends.len()).unwrap_or(u32::MAX).max(1);
        let last = ends.len().saturating_sub(1);
        let start = tokio::time::Instant::now();

        tracing::debug!(
            "Animating message {} ({} chars, {:?} per char)",
            job.message_id,
            ends.len(),
            interval
        );

        for (i, end) in ends.iter().enumerate() {
            // Absolute deadlines keep the total within `max_total`.
            let step = u32::try_from(i + 1).unwrap_or(u32::MAX);
            let due = start + total.saturating_mul(step) / count;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!("Animation of {} cancelled", job.message_id);
                    return AnimationOutcome::Cancelled;
                }
                _ = tokio::time::sleep_until(due) => {}
            }

            let shown = &job.text[..*end];
            if !target.reveal(&job.message_id, shown) {
                tracing::debug!("Message {} vanished during animation", job.message_id);
                return AnimationOutcome::Vanished;
            }

            if let Some(queue) = sync {
                if i % self.sync_stride == 0 || i == last {
                    queue.push(progress_job(job, shown, AnimationState::Typing));
                }
            }
        }

        if cancel.is_cancelled() {
            return AnimationOutcome::Cancelled;
        }
        if !target.complete(&job.message_id) {
            return AnimationOutcome::Vanished;
        }
        if let Some(queue) = sync {
            queue.push(progress_job(job, &job.text, AnimationState::Complete));
        }
        AnimationOutcome::Completed
    }
}

fn progress_job(job: &AnimationJob, shown: &str, state: AnimationState) -> SyncJob {
    SyncJob::UpdateMessage {
        session_id: job.session_id.clone(),
        message_id: job.message_id.clone(),
        update: MessageUpdate {
            text: job.text.clone(),
            display_text: shown.to_string(),
            animation_state: state,
        },
    }
}
