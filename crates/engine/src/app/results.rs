use super::config::SessionOptions;

/// Label shown next to a result to tell which stepping produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModeBadge {
    /// Enhanced stepping only.
    Enhanced,
    /// Sub-step splitting together with enhanced stepping.
    SplitEnhanced,
    /// Sub-step splitting with the host's own step count.
    Split,
}

impl ModeBadge {
    pub fn label(self) -> &'static str {
        match self {
            ModeBadge::Enhanced => "PB",
            ModeBadge::SplitEnhanced => "CBF+PB",
            ModeBadge::Split => "CBF",
        }
    }
}

/// Decides what happens to a finished attempt under the active options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultGate {
    options: SessionOptions,
}

impl ResultGate {
    pub fn new(options: SessionOptions) -> Self {
        Self { options }
    }

    /// Safe mode keeps results local unless the session is soft-disabled.
    pub fn should_submit(&self) -> bool {
        !(self.options.safe_mode_suppresses_result_submission && self.options.enabled)
    }

    /// Whether a result counts toward progress. Unrated content always
    /// counts; otherwise only runs without enhanced stepping whose inputs
    /// were not split mid-step.
    pub fn result_is_valid(&self, unrated: bool) -> bool {
        if unrated {
            return true;
        }
        let enhanced = self.options.simulation_mode.is_enhanced();
        let unsplit = !self.options.enabled || self.options.dispatch_inputs_only_at_step_boundary;
        unsplit && !enhanced
    }

    pub fn mode_badge(&self) -> Option<ModeBadge> {
        let enhanced = self.options.simulation_mode.is_enhanced();
        let splitting = self.options.enabled && !self.options.dispatch_inputs_only_at_step_boundary;
        match (splitting, enhanced) {
            (false, true) => Some(ModeBadge::Enhanced),
            (true, true) => Some(ModeBadge::SplitEnhanced),
            (true, false) => Some(ModeBadge::Split),
            (false, false) => None,
        }
    }
}
