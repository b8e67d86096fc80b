//! Workspace switching.
//!
//! The compositor offers no single switching mechanism that works in every
//! situation, so [`SwitchCoordinator`] walks an ordered chain of
//! [`SwitchStrategy`] objects.  Each strategy has a side-effect free
//! precondition and an attempt; the first attempt that has a visible effect
//! ends the chain.
//!
//! The default chain is:
//!
//! 1. [`AcceleratorStrategy`]: synthesize the "go to workspace N" shortcut.
//! 2. [`MarkerWindowStrategy`]: activate a marker window pinned to the target.
//! 3. [`OverviewStrategy`]: click the target's tile in the workspace overview.
//!
//! Switching is fire-and-forget.  A single in-progress guard serialises
//! switches; requests arriving while a switch runs are dropped.

use crate::config::SwitchConfig;
use crate::traits::{Desktop, KeyBinding};
use crate::workspace::Workspace;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Possible errors from a switch attempt.  Never surfaced to callers.
#[derive(Debug, thiserror::Error)]
pub enum SwitchError {
    /// The desktop backend returned an error.
    #[error("desktop error: {0}")]
    Desktop(String),
    /// What the precondition saw is gone by the time of the attempt.
    #[error("{0} disappeared before the attempt")]
    Vanished(&'static str),
}

impl SwitchError {
    fn desktop(e: impl std::fmt::Display) -> Self {
        SwitchError::Desktop(e.to_string())
    }
}

/// A switch request: the target and its display's live workspaces.
#[derive(Debug, Clone)]
pub struct SwitchPlan {
    pub target: Workspace,
    /// Live workspaces on the target's display, in position order.
    pub display_workspaces: Vec<Workspace>,
}

impl SwitchPlan {
    pub fn new(target: Workspace, mut display_workspaces: Vec<Workspace>) -> Self {
        display_workspaces.sort_by_key(|w| w.position_index);
        Self {
            target,
            display_workspaces,
        }
    }

    /// Whether a fullscreen workspace sits before the target on its display.
    pub fn fullscreen_precedes(&self) -> bool {
        self.display_workspaces
            .iter()
            .any(|w| w.is_fullscreen && w.position_index < self.target.position_index)
    }

    /// 0-based index of the target in visual order.
    pub fn visual_index(&self) -> usize {
        self.display_workspaces
            .iter()
            .position(|w| w.id == self.target.id)
            .unwrap_or_else(|| self.target.position_index.saturating_sub(1) as usize)
    }
}

/// One way of getting the compositor to show a workspace.
pub trait SwitchStrategy<D: Desktop>: Send + Sync {
    fn name(&self) -> &'static str;

    /// Precondition.  Must not change anything on the desktop.
    fn is_applicable(&self, desktop: &D, plan: &SwitchPlan) -> bool;

    fn attempt(&self, desktop: &D, plan: &SwitchPlan) -> Result<(), SwitchError>;

    /// Undo visual leftovers after a failed or ineffective attempt.
    fn recover(&self, _desktop: &D) {}
}

//  S1: accelerator simulation

/// Synthesizes the shortcut bound to "go to workspace N".
///
/// Only applicable when the shortcut the desktop has bound to the target
/// workspace is exactly `modifiers` + the target's position digit.  A key
/// bound to some other workspace is never pressed.  Fullscreen slots break
/// the position numbering, so the strategy also stays out when the target or
/// anything before it is fullscreen.
pub struct AcceleratorStrategy {
    modifiers: Vec<String>,
}

impl AcceleratorStrategy {
    pub fn new(modifiers: Vec<String>) -> Self {
        Self { modifiers }
    }

    /// The binding this strategy would press for `position`.  Positions
    /// past 10 have no digit key.
    pub fn expected_binding(&self, position: u32) -> Option<KeyBinding> {
        let key = match position {
            1..=9 => position.to_string(),
            10 => "0".to_string(),
            _ => return None,
        };
        Some(KeyBinding::new(&self.modifiers, key))
    }
}

impl<D: Desktop> SwitchStrategy<D> for AcceleratorStrategy {
    fn name(&self) -> &'static str {
        "accelerator"
    }

    fn is_applicable(&self, desktop: &D, plan: &SwitchPlan) -> bool {
        if plan.target.is_fullscreen || plan.fullscreen_precedes() {
            return false;
        }
        let position = plan.target.position_index;
        let Some(expected) = self.expected_binding(position) else {
            return false;
        };
        match desktop.workspace_binding(&plan.target.id) {
            Ok(Some(bound)) if bound == expected => true,
            Ok(Some(bound)) => {
                debug!(
                    "workspace {} (position {}) is bound to {}, expected {}",
                    plan.target.id, position, bound, expected
                );
                false
            }
            Ok(None) => false,
            Err(e) => {
                debug!("cannot read shortcut table: {}", e);
                false
            }
        }
    }

    fn attempt(&self, desktop: &D, plan: &SwitchPlan) -> Result<(), SwitchError> {
        let binding = self
            .expected_binding(plan.target.position_index)
            .ok_or(SwitchError::Vanished("binding"))?;
        desktop.send_key(&binding).map_err(SwitchError::desktop)
    }
}

//  S2: marker window

/// Activates the marker window pinned to the target workspace.
pub struct MarkerWindowStrategy;

impl<D: Desktop> SwitchStrategy<D> for MarkerWindowStrategy {
    fn name(&self) -> &'static str {
        "marker-window"
    }

    fn is_applicable(&self, desktop: &D, plan: &SwitchPlan) -> bool {
        matches!(desktop.marker_window(&plan.target.id), Ok(Some(_)))
    }

    fn attempt(&self, desktop: &D, plan: &SwitchPlan) -> Result<(), SwitchError> {
        let address = desktop
            .marker_window(&plan.target.id)
            .map_err(SwitchError::desktop)?
            .ok_or(SwitchError::Vanished("marker window"))?;
        desktop.activate_window(&address).map_err(SwitchError::desktop)
    }
}

//  S3: overview automation

/// Opens the workspace overview and clicks the target's tile.
///
/// Works on visual order, so fullscreen targets are fine.
pub struct OverviewStrategy {
    open_delay: Duration,
}

impl OverviewStrategy {
    pub fn new(open_delay: Duration) -> Self {
        Self { open_delay }
    }
}

impl<D: Desktop> SwitchStrategy<D> for OverviewStrategy {
    fn name(&self) -> &'static str {
        "overview"
    }

    fn is_applicable(&self, _desktop: &D, _plan: &SwitchPlan) -> bool {
        true
    }

    fn attempt(&self, desktop: &D, plan: &SwitchPlan) -> Result<(), SwitchError> {
        let display = &plan.target.display_id;
        desktop.open_overview(display).map_err(SwitchError::desktop)?;
        if !self.open_delay.is_zero() {
            thread::sleep(self.open_delay);
        }
        desktop
            .click_overview_tile(display, plan.visual_index())
            .map_err(SwitchError::desktop)
    }

    fn recover(&self, desktop: &D) {
        if let Err(e) = desktop.dismiss_overview() {
            warn!("could not dismiss overview: {}", e);
        }
    }
}

//  Coordinator

struct Chain<D: Desktop> {
    desktop: D,
    strategies: Vec<Box<dyn SwitchStrategy<D>>>,
    verify: Duration,
}

impl<D: Desktop> Chain<D> {
    fn run(&self, plan: &SwitchPlan) -> Option<&'static str> {
        for strategy in &self.strategies {
            let name = strategy.name();
            if !strategy.is_applicable(&self.desktop, plan) {
                debug!("{}: not applicable", name);
                continue;
            }
            match strategy.attempt(&self.desktop, plan) {
                Ok(()) if self.took_effect(plan) => {
                    info!("switched to {} via {}", plan.target.id, name);
                    return Some(name);
                }
                Ok(()) => {
                    debug!("{}: no visible effect", name);
                    strategy.recover(&self.desktop);
                }
                Err(e) => {
                    debug!("{}: {}", name, e);
                    strategy.recover(&self.desktop);
                }
            }
        }
        warn!("could not switch to workspace {}", plan.target.id);
        None
    }

    /// Whether the target display now shows the target.  If the desktop
    /// cannot tell, the attempt is taken at its word.
    fn took_effect(&self, plan: &SwitchPlan) -> bool {
        if !self.verify.is_zero() {
            thread::sleep(self.verify);
        }
        match self.desktop.active_workspace(&plan.target.display_id) {
            Ok(Some(id)) => id == plan.target.id,
            Ok(None) => true,
            Err(e) => {
                debug!("cannot verify switch: {}", e);
                true
            }
        }
    }
}

/// Runs switch chains on a worker thread, one at a time.
pub struct SwitchCoordinator<D: Desktop + 'static> {
    chain: Arc<Chain<D>>,
    in_progress: Arc<AtomicBool>,
    settle: Duration,
}

impl<D: Desktop + 'static> SwitchCoordinator<D> {
    /// The default chain, filtered by `config`.
    pub fn new(desktop: D, config: &SwitchConfig) -> Self {
        let mut strategies: Vec<Box<dyn SwitchStrategy<D>>> = Vec::new();
        if config.accelerator.enabled {
            strategies.push(Box::new(AcceleratorStrategy::new(
                config.accelerator.modifiers.clone(),
            )));
        }
        strategies.push(Box::new(MarkerWindowStrategy));
        if config.overview.enabled {
            strategies.push(Box::new(OverviewStrategy::new(Duration::from_millis(
                config.overview.open_delay_ms,
            ))));
        }
        Self::with_strategies(
            desktop,
            strategies,
            Duration::from_millis(config.verify_ms),
            Duration::from_millis(config.settle_ms),
        )
    }

    pub fn with_strategies(
        desktop: D,
        strategies: Vec<Box<dyn SwitchStrategy<D>>>,
        verify: Duration,
        settle: Duration,
    ) -> Self {
        Self {
            chain: Arc::new(Chain {
                desktop,
                strategies,
                verify,
            }),
            in_progress: Arc::new(AtomicBool::new(false)),
            settle,
        }
    }

    pub fn is_switching(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Start switching to `plan.target` in the background.
    ///
    /// Returns `false` if another switch is still running; the request is
    /// dropped in that case.
    pub fn switch_to(&self, plan: SwitchPlan) -> bool {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("switch in progress, dropping request for {}", plan.target.id);
            return false;
        }

        let chain = Arc::clone(&self.chain);
        let guard = Arc::clone(&self.in_progress);
        let settle = self.settle;
        let spawned = thread::Builder::new()
            .name("switch".into())
            .spawn(move || {
                chain.run(&plan);
                thread::sleep(settle);
                guard.store(false, Ordering::Release);
            });
        if let Err(e) = spawned {
            warn!("could not spawn switch thread: {}", e);
            self.in_progress.store(false, Ordering::Release);
            return false;
        }
        true
    }

    /// Run the chain synchronously on the calling thread, ignoring the
    /// guard.  Returns the name of the strategy that worked.
    pub fn run_chain(&self, plan: &SwitchPlan) -> Option<&'static str> {
        self.chain.run(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::fixtures::{fullscreen, slot};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Instant;

    //  Mock desktop

    #[derive(Debug, thiserror::Error)]
    #[error("mock desktop error")]
    struct MockErr;

    /// Records every call.  Successful switching actions make the target
    /// active unless `ineffective` is set.
    #[derive(Default)]
    struct MockDesktop {
        calls: Mutex<Vec<String>>,
        /// workspace id -> bound shortcut
        bindings: HashMap<String, KeyBinding>,
        marker: Option<String>,
        click_fails: bool,
        ineffective: bool,
        pending_target: Mutex<Option<String>>,
        active: Mutex<Option<String>>,
    }

    impl MockDesktop {
        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn switched(&self) {
            if !self.ineffective {
                *self.active.lock().unwrap() = self.pending_target.lock().unwrap().clone();
            }
        }
    }

    impl Desktop for MockDesktop {
        type Error = MockErr;

        fn workspace_binding(&self, workspace_id: &str) -> Result<Option<KeyBinding>, MockErr> {
            self.record(format!("binding {}", workspace_id));
            Ok(self.bindings.get(workspace_id).cloned())
        }

        fn send_key(&self, binding: &KeyBinding) -> Result<(), MockErr> {
            self.record(format!("key {}", binding));
            self.switched();
            Ok(())
        }

        fn marker_window(&self, workspace_id: &str) -> Result<Option<String>, MockErr> {
            self.record(format!("marker {}", workspace_id));
            Ok(self.marker.clone())
        }

        fn activate_window(&self, address: &str) -> Result<(), MockErr> {
            self.record(format!("activate {}", address));
            self.switched();
            Ok(())
        }

        fn open_overview(&self, display_id: &str) -> Result<(), MockErr> {
            self.record(format!("overview {}", display_id));
            Ok(())
        }

        fn click_overview_tile(&self, _display_id: &str, visual_index: usize) -> Result<(), MockErr> {
            self.record(format!("click {}", visual_index));
            if self.click_fails {
                return Err(MockErr);
            }
            self.switched();
            Ok(())
        }

        fn dismiss_overview(&self) -> Result<(), MockErr> {
            self.record("dismiss");
            Ok(())
        }

        fn active_workspace(&self, _display_id: &str) -> Result<Option<String>, MockErr> {
            Ok(self.active.lock().unwrap().clone())
        }
    }

    fn plan(target: usize, slots: Vec<crate::workspace::RawWorkspace>) -> SwitchPlan {
        let ws: Vec<Workspace> = slots.iter().map(Workspace::from_raw).collect();
        SwitchPlan::new(ws[target].clone(), ws)
    }

    fn coordinator(desktop: MockDesktop, settle: Duration) -> SwitchCoordinator<MockDesktop> {
        SwitchCoordinator::with_strategies(
            desktop,
            vec![
                Box::new(AcceleratorStrategy::new(vec!["SUPER".into()])),
                Box::new(MarkerWindowStrategy),
                Box::new(OverviewStrategy::new(Duration::ZERO)),
            ],
            Duration::ZERO,
            settle,
        )
    }

    fn run(desktop: MockDesktop, plan: &SwitchPlan) -> (Option<&'static str>, Vec<String>) {
        *desktop.pending_target.lock().unwrap() = Some(plan.target.id.clone());
        *desktop.active.lock().unwrap() = Some("elsewhere".into());
        let c = coordinator(desktop, Duration::ZERO);
        let used = c.run_chain(plan);
        (used, c.chain.desktop.calls())
    }

    fn super_binding(key: &str) -> Option<KeyBinding> {
        Some(KeyBinding::new(["SUPER"], key))
    }

    /// `SUPER+N` bound to workspace id `N` for every id given.
    fn super_bindings(ids: &[&str]) -> HashMap<String, KeyBinding> {
        ids.iter()
            .map(|id| (id.to_string(), KeyBinding::new(["SUPER"], *id)))
            .collect()
    }

    #[test]
    fn accelerator_used_when_binding_matches() {
        let p = plan(1, vec![slot("1", "D", 1), slot("2", "D", 2)]);
        let desktop = MockDesktop {
            bindings: super_bindings(&["1", "2"]),
            ..Default::default()
        };
        let (used, calls) = run(desktop, &p);
        assert_eq!(used, Some("accelerator"));
        assert_eq!(calls, vec!["binding 2", "key SUPER+2"]);
    }

    #[test]
    fn key_bound_to_another_workspace_is_never_pressed() {
        // Id 2 was destroyed: id 3 is second on the display, but SUPER+2
        // would open workspace 2.
        let p = plan(1, vec![slot("1", "D", 1), slot("3", "D", 2)]);
        let desktop = MockDesktop {
            bindings: super_bindings(&["1", "2", "3"]),
            marker: Some("0xabc".into()),
            ..Default::default()
        };
        let (used, calls) = run(desktop, &p);
        assert_eq!(used, Some("marker-window"));
        assert_eq!(calls[0], "binding 3");
        assert!(!calls.iter().any(|c| c.starts_with("key")));
    }

    #[test]
    fn preceding_fullscreen_skips_accelerator_without_probing_it() {
        let p = plan(1, vec![fullscreen("1", "D", 1, "mpv"), slot("2", "D", 2)]);
        let desktop = MockDesktop {
            bindings: super_bindings(&["1", "2"]),
            marker: Some("0xabc".into()),
            ..Default::default()
        };
        let (used, calls) = run(desktop, &p);
        assert_eq!(used, Some("marker-window"));
        assert!(!calls.iter().any(|c| c.starts_with("key")));
        assert!(!calls.iter().any(|c| c.starts_with("binding")));
        assert_eq!(calls, vec!["marker 2", "marker 2", "activate 0xabc"]);
    }

    #[test]
    fn mismatched_binding_falls_through() {
        let p = plan(0, vec![slot("1", "D", 1)]);
        let desktop = MockDesktop {
            bindings: HashMap::from([("1".to_string(), KeyBinding::new(["SUPER", "SHIFT"], "1"))]),
            marker: Some("0xabc".into()),
            ..Default::default()
        };
        let (used, calls) = run(desktop, &p);
        assert_eq!(used, Some("marker-window"));
        assert!(!calls.iter().any(|c| c.starts_with("key")));
    }

    #[test]
    fn overview_clicks_visual_position_for_fullscreen_target() {
        let p = plan(1, vec![slot("1", "D", 1), fullscreen("5", "D", 3, "mpv")]);
        let (used, calls) = run(MockDesktop::default(), &p);
        assert_eq!(used, Some("overview"));
        assert_eq!(calls, vec!["marker 5", "overview D", "click 1"]);
    }

    #[test]
    fn overview_failure_dismisses() {
        let p = plan(0, vec![slot("1", "D", 1)]);
        let desktop = MockDesktop {
            click_fails: true,
            ..Default::default()
        };
        let (used, calls) = run(desktop, &p);
        assert_eq!(used, None);
        assert_eq!(calls.last().map(String::as_str), Some("dismiss"));
    }

    #[test]
    fn ineffective_attempt_moves_on() {
        let p = plan(0, vec![slot("1", "D", 1)]);
        let desktop = MockDesktop {
            bindings: super_bindings(&["1"]),
            marker: Some("0xabc".into()),
            ineffective: true,
            ..Default::default()
        };
        let (used, calls) = run(desktop, &p);
        assert_eq!(used, None);
        assert!(calls.contains(&"key SUPER+1".to_string()));
        assert!(calls.contains(&"activate 0xabc".to_string()));
        assert_eq!(calls.last().map(String::as_str), Some("dismiss"));
    }

    #[test]
    fn position_ten_uses_zero_and_beyond_has_no_key() {
        let s = AcceleratorStrategy::new(vec!["SUPER".into()]);
        assert_eq!(s.expected_binding(10), super_binding("0"));
        assert_eq!(s.expected_binding(11), None);
        assert_eq!(s.expected_binding(0), None);
    }

    #[test]
    fn concurrent_switch_is_dropped() {
        let p = plan(0, vec![slot("1", "D", 1)]);
        let c = coordinator(MockDesktop::default(), Duration::from_millis(150));
        assert!(c.switch_to(p.clone()));
        assert!(!c.switch_to(p.clone()));

        let deadline = Instant::now() + Duration::from_secs(2);
        while c.is_switching() {
            assert!(Instant::now() < deadline, "guard never released");
            thread::sleep(Duration::from_millis(10));
        }
        assert!(c.switch_to(p));
    }
}
