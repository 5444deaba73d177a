//! Single-owner vocabulary tooltip.
//!
//! At most one tooltip exists at a time. Activating a new one dismisses the
//! previous one first; any dismissal returns the controller to idle.

use crate::config::TooltipConfig;
use crate::content::VocabularyMap;

/// Viewport-relative box of the clicked word, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnchorRect {
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

/// Size of the visible page area, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Above,
    Below,
}

/// Everything the host needs to paint the popup (fixed positioning).
#[derive(Debug, Clone, PartialEq)]
pub struct TooltipSpec {
    /// Increases with every activation; lets the host tell instances apart.
    pub id: u64,
    pub word: String,
    pub definition: String,
    pub top: f64,
    pub left: f64,
    pub placement: Placement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DismissReason {
    CloseButton,
    OutsideClick,
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TooltipState {
    Idle,
    Visible,
}

#[derive(Debug)]
pub struct TooltipController {
    config: TooltipConfig,
    active: Option<TooltipSpec>,
    next_id: u64,
}

impl TooltipController {
    pub fn new(config: TooltipConfig) -> Self {
        Self { config, active: None, next_id: 1 }
    }

    pub fn state(&self) -> TooltipState {
        match self.active {
            Some(_) => TooltipState::Visible,
            None => TooltipState::Idle,
        }
    }

    pub fn active(&self) -> Option<&TooltipSpec> {
        self.active.as_ref()
    }

    /// Show the definition of `word` next to `anchor`. Unknown words are
    /// ignored and leave any current tooltip in place.
    pub fn activate(
        &mut self,
        word: &str,
        anchor: AnchorRect,
        vocab: &VocabularyMap,
        viewport: Viewport,
    ) -> Option<TooltipSpec> {
        let entry = vocab.get(word)?;
        self.dismiss(DismissReason::Superseded);

        let (top, placement) = place_vertically(&self.config, anchor, viewport.height);
        let spec = TooltipSpec {
            id: self.next_id,
            word: entry.word.clone(),
            definition: entry.definition.clone(),
            top,
            left: place_horizontally(&self.config, anchor, viewport.width),
            placement,
        };
        self.next_id += 1;
        self.active = Some(spec.clone());
        Some(spec)
    }

    /// Remove the active tooltip, returning it if there was one.
    pub fn dismiss(&mut self, reason: DismissReason) -> Option<TooltipSpec> {
        let dismissed = self.active.take();
        if let Some(spec) = &dismissed {
            log::debug!("tooltip {} ({}) dismissed: {reason:?}", spec.id, spec.word);
        }
        dismissed
    }
}

/// Aligned with the anchor's left edge, pulled back so the estimated width
/// stays inside the viewport. A viewport narrower than the tooltip pins it at 0.
fn place_horizontally(cfg: &TooltipConfig, anchor: AnchorRect, viewport_width: f64) -> f64 {
    anchor.left.min(viewport_width - cfg.estimated_width).max(0.0)
}

/// Above the anchor when it fits, else below; if neither fits, whichever
/// side has more room.
fn place_vertically(cfg: &TooltipConfig, anchor: AnchorRect, viewport_height: f64) -> (f64, Placement) {
    let above = anchor.top - cfg.gap - cfg.estimated_height;
    let below = anchor.top + anchor.height + cfg.gap;
    if above >= 0.0 {
        return (above, Placement::Above);
    }
    if below + cfg.estimated_height <= viewport_height {
        return (below, Placement::Below);
    }
    let room_above = anchor.top;
    let room_below = viewport_height - (anchor.top + anchor.height);
    if room_above >= room_below {
        (above.max(0.0), Placement::Above)
    } else {
        (below, Placement::Below)
    }
}
