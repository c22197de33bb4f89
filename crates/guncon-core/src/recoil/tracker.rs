use std::time::Duration;

use log::debug;

use crate::memory::EmulationState;
use crate::signal::ChannelSide;

use super::rules::{FireMode, RuleTable, ShotEdge, SustainedFire, TitleProbeRule};
use super::{NEVER, RecoilEvent, TriggerSnapshot};

/// Baseline of a probe that has not been sampled yet.
const NO_SAMPLE: u32 = u32::MAX;

/// Inputs published by the emulation thread for one poll.
#[derive(Debug, Clone, Copy)]
pub struct PollInput {
    pub now_us: i64,
    pub trigger: TriggerSnapshot,
    pub offscreen: bool,
}

/// Edge detector turning ammo counter drops into recoil events.
///
/// Owns the per-session state of one light gun: the active title, the last
/// reading of every probe and the sticky sustained-fire mode.
pub struct RecoilTracker {
    port: u32,
    rules: RuleTable,
    window: Duration,
    suppress_offscreen: bool,
    title: Option<String>,
    last_values: Vec<u32>,
    sustained: Option<SustainedFire>,
}

impl RecoilTracker {
    pub fn new(port: u32, rules: RuleTable, window: Duration, suppress_offscreen: bool) -> Self {
        Self {
            port,
            rules,
            window,
            suppress_offscreen,
            title: None,
            last_values: Vec::new(),
            sustained: None,
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Switch to another title (or none). Resets every piece of session state.
    pub fn set_title(&mut self, title: Option<String>) {
        self.title = title.filter(|t| !t.is_empty());
        self.sustained = None;
        let probes = self.rule().map_or(0, |rule| rule.ammo.len());
        self.last_values = vec![NO_SAMPLE; probes];
    }

    pub fn full_auto_active(&self) -> bool {
        self.sustained.is_some()
    }

    pub fn rule(&self) -> Option<&'static TitleProbeRule> {
        self.rules.lookup(self.title.as_deref()?, self.port)
    }

    /// Recoil side events go to: the rule's forced side or the port's own.
    pub fn side(&self) -> ChannelSide {
        self.rule()
            .map_or_else(|| ChannelSide::for_port(self.port), |rule| rule.side())
    }

    /// Sample the rule's probes once. Returns at most one event.
    pub fn poll(&mut self, mem: &dyn EmulationState, input: PollInput) -> Option<RecoilEvent> {
        let rule = self.rule()?;
        if self.last_values.len() != rule.ammo.len() {
            self.last_values = vec![NO_SAMPLE; rule.ammo.len()];
        }

        if rule.fight_active.is_some_and(|gate| gate.read(mem) == 0) {
            self.last_values.fill(NO_SAMPLE);
            return self.end_sustained();
        }

        if self.sustained.is_some() && !input.trigger.down {
            return self.end_sustained();
        }

        let window = if rule.slow_animation {
            self.window * 2
        } else {
            self.window
        };
        let anchor_us = rule
            .anchor
            .timestamp(input.trigger.last_press_us, input.trigger.last_release_us);
        let in_window = within_window(input.now_us, anchor_us, window);
        let mode = rule
            .weapon_mode
            .map_or(FireMode::Single, |wm| wm.classify(wm.probe.read(mem)));

        let mut event = None;
        for (slot, probe) in rule.ammo.iter().enumerate() {
            let value = probe.read(mem);

            #[cfg(feature = "recoil-trace")]
            log::trace!(
                "Recoil: port {} probe {:#010X} = {value} (prev {})",
                self.port,
                probe.addr,
                self.last_values[slot]
            );

            if value == 0 {
                // Unreadable/torn word, never a shot. On an ammo counter it
                // also means an empty magazine.
                if rule.shot == ShotEdge::Decrease && event.is_none() && self.sustained.is_some() {
                    event = self.end_sustained();
                }
                continue;
            }

            let previous = std::mem::replace(&mut self.last_values[slot], value);
            if event.is_some() || previous == NO_SAMPLE || !rule.shot.fired(previous, value) {
                continue;
            }

            event = self.classify_shot(mode, in_window, &input);
        }

        event
    }

    fn classify_shot(&mut self, mode: FireMode, in_window: bool, input: &PollInput) -> Option<RecoilEvent> {
        if !in_window {
            return None;
        }
        if self.suppress_offscreen && input.offscreen {
            debug!("Recoil: port {} shot offscreen, suppressed", self.port);
            return None;
        }

        match mode {
            FireMode::Single => Some(RecoilEvent::Gunshot),
            FireMode::MultiShot => Some(RecoilEvent::TripleShot),
            // Sustained fire only lasts while the trigger is held; a shot
            // leaving on release is a single one.
            FireMode::Sustained(_) if !input.trigger.down => Some(RecoilEvent::Gunshot),
            FireMode::Sustained(kind) => {
                if self.sustained.is_some() {
                    return None;
                }
                self.sustained = Some(kind);
                Some(kind.on_event())
            }
        }
    }

    fn end_sustained(&mut self) -> Option<RecoilEvent> {
        self.sustained.take().map(SustainedFire::off_event)
    }
}

fn within_window(now_us: i64, anchor_us: i64, window: Duration) -> bool {
    if anchor_us == NEVER {
        return false;
    }
    let elapsed = now_us.saturating_sub(anchor_us);
    let window_us = i64::try_from(window.as_micros()).unwrap_or(i64::MAX);
    (0..=window_us).contains(&elapsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{RunState, Width};
    use crate::recoil::DEFAULT_WINDOW;
    use crate::recoil::rules::{Anchor, Probe, ValueMatch, WeaponModeRule};
    use std::collections::HashMap;

    const AMMO: u32 = 0x1000;
    const AMMO_2: u32 = 0x1004;
    const MODE: u32 = 0x2000;
    const FIGHT: u32 = 0x3000;

    #[derive(Default)]
    struct FakeMemory {
        words: HashMap<u32, u32>,
    }

    impl FakeMemory {
        fn set(&mut self, addr: u32, value: u32) {
            self.words.insert(addr, value);
        }
    }

    impl EmulationState for FakeMemory {
        fn read_u8(&self, addr: u32) -> u8 {
            self.read_u32(addr) as u8
        }

        fn read_u16(&self, addr: u32) -> u16 {
            self.read_u32(addr) as u16
        }

        fn read_u32(&self, addr: u32) -> u32 {
            self.words.get(&addr).copied().unwrap_or(0)
        }

        fn run_state(&self) -> RunState {
            RunState::Running
        }
    }

    const fn probe(addr: u32) -> Probe {
        Probe {
            addr,
            width: Width::U16,
        }
    }

    const SINGLE_AMMO: &[Probe] = &[probe(AMMO)];
    const TWO_AMMO: &[Probe] = &[probe(AMMO), probe(AMMO_2)];

    static RULES: &[TitleProbeRule] = &[
        TitleProbeRule::new("PISTOL", 0, SINGLE_AMMO),
        TitleProbeRule {
            slow_animation: true,
            ..TitleProbeRule::new("SLOW", 0, SINGLE_AMMO)
        },
        TitleProbeRule {
            weapon_mode: Some(WeaponModeRule {
                probe: probe(MODE),
                sustained: Some((ValueMatch::Equals(3), SustainedFire::Auto)),
                multi_shot: Some(ValueMatch::Equals(5)),
            }),
            ..TitleProbeRule::new("AUTO", 0, SINGLE_AMMO)
        },
        TitleProbeRule {
            anchor: Anchor::Release,
            ..TitleProbeRule::new("CHARGE", 0, SINGLE_AMMO)
        },
        TitleProbeRule {
            fight_active: Some(probe(FIGHT)),
            ..TitleProbeRule::new("GATED", 0, SINGLE_AMMO)
        },
        TitleProbeRule::new("DUAL", 0, TWO_AMMO),
    ];

    fn tracker(title: &str) -> RecoilTracker {
        let mut t = RecoilTracker::new(0, RuleTable::new(RULES), DEFAULT_WINDOW, false);
        t.set_title(Some(title.to_string()));
        t
    }

    fn held(press_us: i64) -> TriggerSnapshot {
        TriggerSnapshot {
            down: true,
            last_press_us: press_us,
            last_release_us: NEVER,
        }
    }

    fn at(now_us: i64, trigger: TriggerSnapshot) -> PollInput {
        PollInput {
            now_us,
            trigger,
            offscreen: false,
        }
    }

    /// Feed a value sequence, one sample every 5 ms, with the press 50 ms
    /// before the last sample.
    fn run(tracker: &mut RecoilTracker, mem: &mut FakeMemory, values: &[u32]) -> Vec<Option<RecoilEvent>> {
        let last_us = (values.len() as i64 - 1) * 5_000;
        let trigger = held(last_us - 50_000);
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                mem.set(AMMO, v);
                tracker.poll(&*mem, at(i as i64 * 5_000, trigger))
            })
            .collect()
    }

    #[test]
    fn drop_within_window_is_one_gunshot() {
        let mut t = tracker("PISTOL");
        let mut mem = FakeMemory::default();
        let events = run(&mut t, &mut mem, &[10, 10, 9]);
        assert_eq!(events, vec![None, None, Some(RecoilEvent::Gunshot)]);
    }

    #[test]
    fn first_sample_never_counts_as_a_drop() {
        let mut t = tracker("PISTOL");
        let mut mem = FakeMemory::default();
        mem.set(AMMO, 3);
        assert_eq!(t.poll(&mem, at(1_000, held(0))), None);
    }

    #[test]
    fn drop_outside_window_is_ignored() {
        let mut t = tracker("PISTOL");
        let mut mem = FakeMemory::default();
        mem.set(AMMO, 10);
        t.poll(&mem, at(0, held(0)));
        mem.set(AMMO, 9);
        assert_eq!(t.poll(&mem, at(150_000, held(0))), None);
    }

    #[test]
    fn drop_without_any_press_is_ignored() {
        let mut t = tracker("PISTOL");
        let mut mem = FakeMemory::default();
        mem.set(AMMO, 10);
        t.poll(&mem, at(0, TriggerSnapshot::default()));
        mem.set(AMMO, 9);
        assert_eq!(t.poll(&mem, at(5_000, TriggerSnapshot::default())), None);
    }

    #[test]
    fn slow_titles_get_a_double_window() {
        let mut t = tracker("SLOW");
        let mut mem = FakeMemory::default();
        mem.set(AMMO, 10);
        t.poll(&mem, at(0, held(0)));
        mem.set(AMMO, 9);
        assert_eq!(
            t.poll(&mem, at(180_000, held(0))),
            Some(RecoilEvent::Gunshot)
        );
    }

    #[test]
    fn full_auto_turns_on_once_and_off_on_release() {
        let mut t = tracker("AUTO");
        let mut mem = FakeMemory::default();
        mem.set(MODE, 3);
        mem.set(AMMO, 30);
        assert_eq!(t.poll(&mem, at(0, held(0))), None);

        mem.set(AMMO, 29);
        assert_eq!(t.poll(&mem, at(10_000, held(0))), Some(RecoilEvent::AutoOn));
        assert!(t.full_auto_active());

        mem.set(AMMO, 28);
        assert_eq!(t.poll(&mem, at(20_000, held(0))), None);

        let released = TriggerSnapshot {
            down: false,
            last_press_us: 0,
            last_release_us: 25_000,
        };
        assert_eq!(t.poll(&mem, at(30_000, released)), Some(RecoilEvent::AutoOff));
        assert!(!t.full_auto_active());
        assert_eq!(t.poll(&mem, at(35_000, released)), None);
    }

    #[test]
    fn full_auto_ends_when_ammo_runs_out() {
        let mut t = tracker("AUTO");
        let mut mem = FakeMemory::default();
        mem.set(MODE, 3);
        mem.set(AMMO, 2);
        t.poll(&mem, at(0, held(0)));
        mem.set(AMMO, 1);
        assert_eq!(t.poll(&mem, at(5_000, held(0))), Some(RecoilEvent::AutoOn));

        mem.set(AMMO, 0);
        assert_eq!(t.poll(&mem, at(10_000, held(0))), Some(RecoilEvent::AutoOff));
        assert_eq!(t.poll(&mem, at(15_000, held(0))), None);
    }

    #[test]
    fn multi_shot_mode_emits_tripleshot() {
        let mut t = tracker("AUTO");
        let mut mem = FakeMemory::default();
        mem.set(MODE, 5);
        mem.set(AMMO, 9);
        t.poll(&mem, at(0, held(0)));
        mem.set(AMMO, 6);
        assert_eq!(
            t.poll(&mem, at(5_000, held(0))),
            Some(RecoilEvent::TripleShot)
        );
    }

    #[test]
    fn charge_rules_anchor_on_release() {
        let mut t = tracker("CHARGE");
        let mut mem = FakeMemory::default();
        mem.set(AMMO, 4);
        t.poll(&mem, at(0, held(0)));

        // Long charge: the press is far in the past, the release is fresh.
        let released = TriggerSnapshot {
            down: false,
            last_press_us: 0,
            last_release_us: 900_000,
        };
        mem.set(AMMO, 3);
        assert_eq!(
            t.poll(&mem, at(950_000, released)),
            Some(RecoilEvent::Gunshot)
        );
    }

    #[test]
    fn closed_fight_gate_blocks_and_resets_baseline() {
        let mut t = tracker("GATED");
        let mut mem = FakeMemory::default();
        mem.set(FIGHT, 1);
        mem.set(AMMO, 6);
        t.poll(&mem, at(0, held(0)));

        mem.set(FIGHT, 0);
        mem.set(AMMO, 5);
        assert_eq!(t.poll(&mem, at(5_000, held(0))), None);

        // Baseline was dropped while the gate was closed.
        mem.set(FIGHT, 1);
        mem.set(AMMO, 4);
        assert_eq!(t.poll(&mem, at(10_000, held(0))), None);
        mem.set(AMMO, 3);
        assert_eq!(t.poll(&mem, at(15_000, held(0))), Some(RecoilEvent::Gunshot));
    }

    #[test]
    fn zero_reading_keeps_previous_baseline() {
        let mut t = tracker("PISTOL");
        let mut mem = FakeMemory::default();
        mem.set(AMMO, 8);
        t.poll(&mem, at(0, held(0)));
        mem.set(AMMO, 0);
        assert_eq!(t.poll(&mem, at(5_000, held(0))), None);
        mem.set(AMMO, 7);
        assert_eq!(t.poll(&mem, at(10_000, held(0))), Some(RecoilEvent::Gunshot));
    }

    #[test]
    fn one_event_per_tick_first_probe_wins() {
        let mut t = tracker("DUAL");
        let mut mem = FakeMemory::default();
        mem.set(AMMO, 5);
        mem.set(AMMO_2, 5);
        t.poll(&mem, at(0, held(0)));

        mem.set(AMMO, 4);
        mem.set(AMMO_2, 4);
        assert_eq!(t.poll(&mem, at(5_000, held(0))), Some(RecoilEvent::Gunshot));
        // Second probe's baseline still advanced, so nothing is replayed.
        assert_eq!(t.poll(&mem, at(10_000, held(0))), None);
    }

    #[test]
    fn offscreen_suppression_drops_shots() {
        let mut t = RecoilTracker::new(0, RuleTable::new(RULES), DEFAULT_WINDOW, true);
        t.set_title(Some("PISTOL".into()));
        let mut mem = FakeMemory::default();
        mem.set(AMMO, 5);
        t.poll(&mem, at(0, held(0)));
        mem.set(AMMO, 4);
        let input = PollInput {
            offscreen: true,
            ..at(5_000, held(0))
        };
        assert_eq!(t.poll(&mem, input), None);
    }

    #[test]
    fn unknown_title_or_cleared_title_is_silent() {
        let mut t = tracker("NOPE");
        let mut mem = FakeMemory::default();
        mem.set(AMMO, 5);
        assert_eq!(t.poll(&mem, at(0, held(0))), None);

        let mut t = tracker("AUTO");
        t.set_title(None);
        assert_eq!(t.title(), None);
        assert_eq!(t.poll(&mem, at(0, held(0))), None);
    }

    #[test]
    fn sustained_mode_needs_a_held_trigger() {
        let mut t = tracker("AUTO");
        let mut mem = FakeMemory::default();
        mem.set(MODE, 3);
        mem.set(AMMO, 30);
        let released = TriggerSnapshot {
            down: false,
            last_press_us: 0,
            last_release_us: 2_000,
        };
        t.poll(&mem, at(0, released));
        mem.set(AMMO, 29);
        assert_eq!(t.poll(&mem, at(5_000, released)), Some(RecoilEvent::Gunshot));
        assert!(!t.full_auto_active());
        mem.set(AMMO, 28);
        assert_eq!(t.poll(&mem, at(10_000, released)), Some(RecoilEvent::Gunshot));
    }

    const GEARBOLT_MODE: u32 = 0x0009_5D60;
    const GEARBOLT_COOLDOWN: u32 = 0x0009_710C;

    fn gearbolt() -> RecoilTracker {
        let mut t = RecoilTracker::new(0, RuleTable::builtin(), DEFAULT_WINDOW, false);
        t.set_title(Some("SLUS-00654".into()));
        t
    }

    /// Cooldown reload and countdown back to idle, one sample every 5 ms.
    fn cooldown_cycle(
        t: &mut RecoilTracker,
        mem: &mut FakeMemory,
        start_us: i64,
        trigger: TriggerSnapshot,
    ) -> Vec<RecoilEvent> {
        let mut values: Vec<u32> = (0..=20).rev().collect();
        values.push(0xFF);
        values
            .into_iter()
            .enumerate()
            .filter_map(|(i, v)| {
                mem.set(GEARBOLT_COOLDOWN, v);
                t.poll(&*mem, at(start_us + i as i64 * 5_000, trigger))
            })
            .collect()
    }

    #[test]
    fn gearbolt_counts_one_shot_per_cooldown_cycle() {
        let mut t = gearbolt();
        let mut mem = FakeMemory::default();
        mem.set(GEARBOLT_COOLDOWN, 0xFF);
        assert_eq!(t.poll(&mem, at(0, held(0))), None);

        assert_eq!(
            cooldown_cycle(&mut t, &mut mem, 5_000, held(0)),
            vec![RecoilEvent::Gunshot]
        );
    }

    #[test]
    fn gearbolt_charge_shot_fires_on_release() {
        let mut t = gearbolt();
        let mut mem = FakeMemory::default();
        mem.set(GEARBOLT_COOLDOWN, 0xFF);
        t.poll(&mem, at(0, held(0)));

        // Charged for two seconds, released just now.
        let released = TriggerSnapshot {
            down: false,
            last_press_us: 0,
            last_release_us: 2_000_000,
        };
        assert_eq!(
            cooldown_cycle(&mut t, &mut mem, 2_005_000, released),
            vec![RecoilEvent::Gunshot]
        );
    }

    #[test]
    fn gearbolt_power_up_is_automatic_until_release() {
        let mut t = gearbolt();
        let mut mem = FakeMemory::default();
        mem.set(GEARBOLT_MODE, 12);
        mem.set(GEARBOLT_COOLDOWN, 0xFF);
        t.poll(&mem, at(0, held(0)));

        let mut events = cooldown_cycle(&mut t, &mut mem, 5_000, held(0));
        events.extend(cooldown_cycle(&mut t, &mut mem, 115_000, held(0)));
        assert_eq!(events, vec![RecoilEvent::AutoOn]);
        assert!(t.full_auto_active());

        let released = TriggerSnapshot {
            down: false,
            last_press_us: 0,
            last_release_us: 230_000,
        };
        assert_eq!(t.poll(&mem, at(235_000, released)), Some(RecoilEvent::AutoOff));
        assert_eq!(t.poll(&mem, at(240_000, released)), None);
    }

    #[test]
    fn window_bounds_are_inclusive() {
        assert!(within_window(100_000, 0, DEFAULT_WINDOW));
        assert!(!within_window(100_001, 0, DEFAULT_WINDOW));
        assert!(!within_window(0, 10, DEFAULT_WINDOW));
        assert!(!within_window(0, NEVER, DEFAULT_WINDOW));
    }
}
