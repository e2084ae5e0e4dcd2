//! # Viewport Pinning
//!
//! Decides whether the message log should follow new content.
//!
//! ```text
//!            scroll sample within threshold
//!        ┌──────────────────────────────────────┐
//!        ▼                                      │
//!   ┌─────────┐   user scrolls up past     ┌────┴─────┐
//!   │ PINNED  │ ─────────────────────────► │ UNPINNED │  new items → pending += delta
//!   └─────────┘       the threshold        └──────────┘
//!     new items → smooth scroll              force / jump-to-latest → PINNED
//! ```
//!
//! The controller never touches a real scroll view. It returns a
//! [`ScrollCommand`] and the presentation layer carries it out.

/// Distance from the bottom edge (px) still treated as "at the bottom".
pub const DEFAULT_PIN_THRESHOLD_PX: f32 = 56.0;

/// What the presentation layer should do to the scroll position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollCommand {
    /// Jump to the bottom without animation.
    JumpToBottom,
    /// Animate to the bottom.
    SmoothToBottom,
}

/// A scroll-position reading from the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollSample {
    /// Offset of the top of the viewport from the top of the content.
    pub offset: f32,
    pub viewport_height: f32,
    pub content_height: f32,
}

impl ScrollSample {
    pub fn distance_from_bottom(&self) -> f32 {
        (self.content_height - self.offset - self.viewport_height).max(0.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewportController {
    /// When true, new content scrolls into view.
    pub is_pinned_to_bottom: bool,
    /// Items that arrived while unpinned ("N new messages").
    pub pending_new_count: usize,
    /// Item count at the last observation.
    last_count: usize,
    threshold_px: f32,
}

impl Default for ViewportController {
    fn default() -> Self {
        Self::new(DEFAULT_PIN_THRESHOLD_PX)
    }
}

impl ViewportController {
    pub fn new(threshold_px: f32) -> Self {
        Self {
            is_pinned_to_bottom: true, // Start attached to bottom
            pending_new_count: 0,
            last_count: 0,
            threshold_px,
        }
    }

    /// Mount or thread switch: snap to bottom and forget pending items.
    pub fn reset(&mut self, item_count: usize) -> ScrollCommand {
        self.is_pinned_to_bottom = true;
        self.pending_new_count = 0;
        self.last_count = item_count;
        ScrollCommand::JumpToBottom
    }

    /// Observes the log's current size.
    pub fn on_item_count(&mut self, item_count: usize) -> Option<ScrollCommand> {
        let previous = std::mem::replace(&mut self.last_count, item_count);
        if item_count <= previous {
            return None;
        }

        // First content after an empty log: no visible animation on open.
        if previous == 0 {
            self.is_pinned_to_bottom = true;
            self.pending_new_count = 0;
            return Some(ScrollCommand::JumpToBottom);
        }

        if self.is_pinned_to_bottom {
            Some(ScrollCommand::SmoothToBottom)
        } else {
            self.pending_new_count += item_count - previous;
            None
        }
    }

    /// Re-evaluates pinning from an explicit scroll sample.
    pub fn on_scroll(&mut self, sample: ScrollSample) {
        self.is_pinned_to_bottom = sample.distance_from_bottom() <= self.threshold_px;
        if self.is_pinned_to_bottom {
            self.pending_new_count = 0;
        }
    }

    /// Thread switch, own send, forced refresh: always land on the newest item.
    pub fn force_scroll(&mut self) -> ScrollCommand {
        self.is_pinned_to_bottom = true;
        self.pending_new_count = 0;
        ScrollCommand::SmoothToBottom
    }

    /// The "jump to latest" affordance.
    pub fn jump_to_latest(&mut self) -> ScrollCommand {
        self.force_scroll()
    }
}
