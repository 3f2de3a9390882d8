//! Scroll anchoring for the message timeline.
//!
//! The core records *intents* when it mutates the timeline, stamped with the
//! state rev that will carry the mutation. The UI reports scroll metrics as
//! the user scrolls and calls [`ScrollAnchor::settle`] after rendering a
//! rev; intents whose rev has not been rendered yet stay pending.

/// Distance from the bottom under which the view counts as pinned.
pub const BOTTOM_THRESHOLD_PX: f64 = 20.0;

#[derive(uniffi::Record, Clone, Copy, Debug, PartialEq)]
pub struct ScrollMetrics {
    pub offset: f64,
    pub scroll_height: f64,
    pub client_height: f64,
}

impl ScrollMetrics {
    pub fn max_offset(&self) -> f64 {
        (self.scroll_height - self.client_height).max(0.0)
    }

    pub fn is_at_bottom(&self) -> bool {
        self.scroll_height - self.offset - self.client_height < BOTTOM_THRESHOLD_PX
    }
}

#[derive(uniffi::Record, Clone, Copy, Debug, PartialEq)]
pub struct ScrollOutcome {
    /// New offset to apply, if the view must move.
    pub offset: Option<f64>,
    pub show_new_message_indicator: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct AnchorCapture {
    rev: u64,
    offset: f64,
    scroll_height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct AppendContext {
    rev: u64,
    was_at_bottom: bool,
}

#[derive(Debug, Default)]
pub struct ScrollAnchor {
    last: Option<ScrollMetrics>,
    bottom_intent: Option<u64>,
    anchor: Option<AnchorCapture>,
    appended: Option<AppendContext>,
    indicator: bool,
}

impl ScrollAnchor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the latest metrics from a user scroll. Reaching the bottom
    /// dismisses the new-message indicator.
    pub fn observe(&mut self, metrics: ScrollMetrics) {
        self.last = Some(metrics);
        if metrics.is_at_bottom() {
            self.indicator = false;
        }
    }

    pub fn request_bottom(&mut self, rev: u64) {
        self.bottom_intent = Some(rev);
    }

    /// Capture the pre-merge position before older messages are prepended.
    /// Returns false when no metrics have been reported yet.
    pub fn capture(&mut self, rev: u64) -> bool {
        let Some(m) = self.last else {
            return false;
        };
        self.capture_metrics(rev, m);
        true
    }

    pub fn capture_metrics(&mut self, rev: u64, metrics: ScrollMetrics) {
        self.anchor = Some(AnchorCapture {
            rev,
            offset: metrics.offset,
            scroll_height: metrics.scroll_height,
        });
    }

    /// Drop a capture whose merge never happened (stale or failed fetch).
    pub fn discard_capture(&mut self) {
        self.anchor = None;
    }

    /// New messages landed at the tail without an explicit intent. Whether
    /// the view follows depends on where it was before the mutation.
    pub fn note_appended(&mut self, rev: u64) {
        let was_at_bottom = self.last.map(|m| m.is_at_bottom()).unwrap_or(true);
        self.appended = Some(AppendContext { rev, was_at_bottom });
    }

    /// Compute the correction for a rendered rev. A bottom intent wins over
    /// an anchor capture, which wins over follow-on-append.
    pub fn settle(&mut self, rendered_rev: u64, metrics: ScrollMetrics) -> ScrollOutcome {
        let mut target = None;

        if self.bottom_intent.is_some_and(|rev| rev <= rendered_rev) {
            self.bottom_intent = None;
            self.anchor = None;
            self.appended = None;
            self.indicator = false;
            target = Some(metrics.max_offset());
        } else if let Some(capture) = self.anchor.filter(|c| c.rev <= rendered_rev) {
            self.anchor = None;
            self.appended = None;
            target = Some(capture.offset + (metrics.scroll_height - capture.scroll_height));
        } else if let Some(ctx) = self.appended.filter(|c| c.rev <= rendered_rev) {
            self.appended = None;
            if ctx.was_at_bottom {
                self.indicator = false;
                target = Some(metrics.max_offset());
            } else {
                self.indicator = true;
            }
        }

        let target = target.filter(|t| (t - metrics.offset).abs() >= 0.5);
        self.last = Some(match target {
            Some(offset) => ScrollMetrics { offset, ..metrics },
            None => metrics,
        });
        ScrollOutcome {
            offset: target,
            show_new_message_indicator: self.indicator,
        }
    }

    /// The indicator was clicked.
    pub fn jump_to_bottom(&mut self, metrics: ScrollMetrics) -> f64 {
        let offset = metrics.max_offset();
        self.indicator = false;
        self.bottom_intent = None;
        self.appended = None;
        self.last = Some(ScrollMetrics { offset, ..metrics });
        offset
    }

    pub fn indicator_visible(&self) -> bool {
        self.indicator
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
