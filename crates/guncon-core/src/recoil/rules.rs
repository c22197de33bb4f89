use crate::memory::{EmulationState, Width};
use crate::signal::ChannelSide;

use super::RecoilEvent;

/// One guest memory word to sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Probe {
    pub addr: u32,
    pub width: Width,
}

impl Probe {
    pub fn read(&self, mem: &dyn EmulationState) -> u32 {
        mem.read(self.addr, self.width)
    }
}

/// Which trigger edge opens the attribution window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// Ammo drops shortly after the trigger is pulled.
    Press,
    /// Charge weapons fire when the trigger is let go.
    Release,
    /// Whichever edge happened last: tap and charge shots on one weapon.
    Either,
}

impl Anchor {
    pub fn timestamp(self, last_press_us: i64, last_release_us: i64) -> i64 {
        match self {
            Self::Press => last_press_us,
            Self::Release => last_release_us,
            Self::Either => last_press_us.max(last_release_us),
        }
    }
}

/// Change of a probe word that counts as one shot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShotEdge {
    /// An ammo counter went down.
    Decrease,
    /// A cooldown counter left its idle value.
    Leaves(u32),
}

impl ShotEdge {
    pub fn fired(self, previous: u32, value: u32) -> bool {
        match self {
            Self::Decrease => value < previous,
            Self::Leaves(idle) => previous == idle && value != idle,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueMatch {
    Equals(u32),
    AtLeast(u32),
    Between(u32, u32),
}

impl ValueMatch {
    pub fn matches(self, value: u32) -> bool {
        match self {
            Self::Equals(v) => value == v,
            Self::AtLeast(v) => value >= v,
            Self::Between(lo, hi) => (lo..=hi).contains(&value),
        }
    }
}

/// Token pair used while a weapon keeps firing on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SustainedFire {
    Auto,
    MachineGun,
}

impl SustainedFire {
    pub fn on_event(self) -> RecoilEvent {
        match self {
            Self::Auto => RecoilEvent::AutoOn,
            Self::MachineGun => RecoilEvent::MachineGunOn,
        }
    }

    pub fn off_event(self) -> RecoilEvent {
        match self {
            Self::Auto => RecoilEvent::AutoOff,
            Self::MachineGun => RecoilEvent::MachineGunOff,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireMode {
    Single,
    Sustained(SustainedFire),
    MultiShot,
}

/// Secondary word selecting the current weapon's fire mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeaponModeRule {
    pub probe: Probe,
    pub sustained: Option<(ValueMatch, SustainedFire)>,
    pub multi_shot: Option<ValueMatch>,
}

impl WeaponModeRule {
    pub fn classify(&self, value: u32) -> FireMode {
        match self.sustained {
            Some((when, kind)) if when.matches(value) => return FireMode::Sustained(kind),
            _ => {}
        }
        if self.multi_shot.is_some_and(|when| when.matches(value)) {
            return FireMode::MultiShot;
        }
        FireMode::Single
    }
}

/// Recoil behavior of one title on one controller port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TitleProbeRule {
    pub title: &'static str,
    pub port: u32,
    /// Ammo words in priority order; the first one that fires wins the tick.
    pub ammo: &'static [Probe],
    pub shot: ShotEdge,
    pub anchor: Anchor,
    /// Titles whose firing animation delays the ammo update get twice the window.
    pub slow_animation: bool,
    pub weapon_mode: Option<WeaponModeRule>,
    /// Events are only produced while this word is non-zero.
    pub fight_active: Option<Probe>,
    /// Drive this recoil side instead of the port's own.
    pub force_side: Option<ChannelSide>,
}

impl TitleProbeRule {
    pub const fn new(title: &'static str, port: u32, ammo: &'static [Probe]) -> Self {
        Self {
            title,
            port,
            ammo,
            shot: ShotEdge::Decrease,
            anchor: Anchor::Press,
            slow_animation: false,
            weapon_mode: None,
            fight_active: None,
            force_side: None,
        }
    }

    pub fn side(&self) -> ChannelSide {
        self.force_side
            .unwrap_or_else(|| ChannelSide::for_port(self.port))
    }
}

/// Read-only lookup of recoil rules by `(title, port)`.
#[derive(Debug, Clone, Copy)]
pub struct RuleTable {
    rules: &'static [TitleProbeRule],
}

impl RuleTable {
    pub const fn new(rules: &'static [TitleProbeRule]) -> Self {
        Self { rules }
    }

    pub const fn builtin() -> Self {
        Self::new(BUILTIN_RULES)
    }

    pub fn lookup(&self, title: &str, port: u32) -> Option<&'static TitleProbeRule> {
        self.rules
            .iter()
            .find(|rule| rule.port == port && rule.title == title)
    }

    pub fn rules(&self) -> &'static [TitleProbeRule] {
        self.rules
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::builtin()
    }
}

const fn probe(addr: u32, width: Width) -> Probe {
    Probe { addr, width }
}

const DIE_HARD_AUTO: Option<(ValueMatch, SustainedFire)> =
    Some((ValueMatch::Equals(3), SustainedFire::Auto));

const CRYPT_KILLER_AMMO_P1: &[Probe] = &[probe(0x000F_C185, Width::U8)];
const CRYPT_KILLER_AMMO_P2: &[Probe] = &[probe(0x000F_C1E1, Width::U8)];
const DIE_HARD_EU_AMMO: &[Probe] = &[probe(0x001F_A0F6, Width::U16)];
const DIE_HARD_US_AMMO: &[Probe] = &[probe(0x001F_77EE, Width::U16)];
const DIE_HARD_2_AMMO: &[Probe] = &[probe(0x000B_542C, Width::U16)];
const GEARBOLT_COOLDOWN: &[Probe] = &[probe(0x0009_710C, Width::U8)];
const PROJECT_TITAN_AMMO: &[Probe] = &[probe(0x0007_D47C, Width::U16)];

static BUILTIN_RULES: &[TitleProbeRule] = &[
    // Crypt Killer (USA)
    TitleProbeRule {
        slow_animation: true,
        ..TitleProbeRule::new("SLUS-00335", 0, CRYPT_KILLER_AMMO_P1)
    },
    TitleProbeRule {
        slow_animation: true,
        ..TitleProbeRule::new("SLUS-00335", 1, CRYPT_KILLER_AMMO_P2)
    },
    // Die Hard Trilogy (Europe)
    TitleProbeRule {
        weapon_mode: Some(WeaponModeRule {
            probe: probe(0x001F_A114, Width::U16),
            sustained: DIE_HARD_AUTO,
            multi_shot: None,
        }),
        ..TitleProbeRule::new("SLES-00445", 0, DIE_HARD_EU_AMMO)
    },
    // Die Hard Trilogy (USA)
    TitleProbeRule {
        weapon_mode: Some(WeaponModeRule {
            probe: probe(0x001F_780C, Width::U16),
            sustained: DIE_HARD_AUTO,
            multi_shot: None,
        }),
        ..TitleProbeRule::new("SLUS-00119", 0, DIE_HARD_US_AMMO)
    },
    // Die Hard Trilogy 2: the gun sits in port 2 but drives recoil side A.
    TitleProbeRule {
        weapon_mode: Some(WeaponModeRule {
            probe: probe(0x000B_557C, Width::U16),
            sustained: DIE_HARD_AUTO,
            multi_shot: None,
        }),
        force_side: Some(ChannelSide::A),
        ..TitleProbeRule::new("SLUS-01015", 1, DIE_HARD_2_AMMO)
    },
    // Elemental Gearbolt (USA): the shot cooldown idles at 0xFF and is
    // reloaded by every shot, tapped or charged. Any power-up gun type is
    // automatic.
    TitleProbeRule {
        shot: ShotEdge::Leaves(0xFF),
        anchor: Anchor::Either,
        weapon_mode: Some(WeaponModeRule {
            probe: probe(0x0009_5D60, Width::U16),
            sustained: Some((ValueMatch::AtLeast(1), SustainedFire::Auto)),
            multi_shot: None,
        }),
        ..TitleProbeRule::new("SLUS-00654", 0, GEARBOLT_COOLDOWN)
    },
    // Time Crisis: Project Titan (USA)
    TitleProbeRule {
        fight_active: Some(probe(0x001D_2575, Width::U8)),
        ..TitleProbeRule::new("SLUS-01336", 0, PROJECT_TITAN_AMMO)
    },
];
