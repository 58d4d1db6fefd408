//! Appearance profiles: the before/during/after visual state applied to
//! elements over a task, including growth-simulation parameters.

use glam::DVec3;

use super::Waiters;

/// What a profile does to its bound elements over the task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProfileAction {
    /// Element is constructed during the task.
    Install,
    /// Element is demolished during the task.
    Remove,
    /// Element exists only during the task (scaffolding etc.).
    Temporary,
    /// Element is worked on during the task but exists throughout.
    Maintenance,
    /// Only appearance changes, no visibility semantics.
    Neutral,
}

impl ProfileAction {
    /// Decode the service's action string.
    ///
    /// The contract is a case-insensitive match on the first letter.
    pub fn parse(s: &str) -> Option<Self> {
        match s.chars().next()?.to_ascii_lowercase() {
            'i' => Some(Self::Install),
            'r' => Some(Self::Remove),
            't' => Some(Self::Temporary),
            'm' => Some(Self::Maintenance),
            'n' => Some(Self::Neutral),
            _ => None,
        }
    }
}

/// An RGB color, 0-255 per channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgb {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Rgb {
    #[inline]
    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }
}

/// One visual state of a profile (before, during or after the task).
///
/// Absent fields are "no effect": the element keeps whatever that aspect
/// was outside the schedule animation.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Appearance {
    /// Explicit visibility override.
    pub visible: Option<bool>,
    /// Color override.
    pub color: Option<Rgb>,
    /// Translucency as a percentage, 0 (opaque) to 100 (invisible).
    pub transparency: Option<f64>,
}

impl Appearance {
    /// Alpha in [0, 1] implied by visibility and transparency.
    ///
    /// `visible == false` wins over any transparency value.
    pub fn alpha(&self) -> f64 {
        if self.visible == Some(false) {
            return 0.0;
        }
        match self.transparency {
            Some(t) => (1.0 - t / 100.0).clamp(0.0, 1.0),
            None => 1.0,
        }
    }

    /// True when this state changes nothing.
    pub fn is_no_effect(&self) -> bool {
        self.visible.is_none() && self.color.is_none() && self.transparency.is_none()
    }

    /// Overlay this appearance on a base state; fields set here win.
    pub fn overlaid_on(&self, base: &Self) -> Self {
        Self {
            visible: self.visible.or(base.visible),
            color: self.color.or(base.color),
            transparency: self.transparency.or(base.transparency),
        }
    }
}

/// Direction the growth-simulation cutting plane sweeps.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GrowthDirection {
    /// Sweep upward (+Z).
    BottomUp,
    /// Sweep downward (-Z).
    TopDown,
    /// Sweep toward +Y.
    North,
    /// Sweep toward -Y.
    South,
    /// Sweep toward +X.
    East,
    /// Sweep toward -X.
    West,
    /// Explicit direction vector.
    Custom(DVec3),
}

impl GrowthDirection {
    /// Decode the service's direction string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "bottomUp" => Some(Self::BottomUp),
            "topDown" => Some(Self::TopDown),
            "north" => Some(Self::North),
            "south" => Some(Self::South),
            "east" => Some(Self::East),
            "west" => Some(Self::West),
            _ => None,
        }
    }

    /// Unit vector the plane normal points along.
    pub fn orientation(&self) -> DVec3 {
        match self {
            Self::BottomUp => DVec3::Z,
            Self::TopDown => DVec3::NEG_Z,
            Self::North => DVec3::Y,
            Self::South => DVec3::NEG_Y,
            Self::East => DVec3::X,
            Self::West => DVec3::NEG_X,
            Self::Custom(v) => v.normalize_or_zero(),
        }
    }
}

/// Growth-simulation parameters of an active appearance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GrowthSimulation {
    pub direction: GrowthDirection,
    /// Couple the plane position to task percent-complete instead of a
    /// straight start-to-end sweep.
    pub percent_complete: bool,
    /// Flip the sweep direction.
    pub invert: bool,
}

impl GrowthSimulation {
    /// Plane orientation after applying the invert flag.
    pub fn orientation(&self) -> DVec3 {
        let v = self.direction.orientation();
        if self.invert {
            -v
        } else {
            v
        }
    }
}

/// The before/during/after visual treatment of elements bound to a task.
///
/// Created as an unresolved shell when first referenced; details arrive
/// with the profile fetch.
#[derive(Clone, Debug)]
pub struct AppearanceProfile {
    /// Server-assigned id.
    pub id: String,
    pub action: ProfileAction,
    /// Appearance before the task starts.
    pub start: Appearance,
    /// Appearance while the task runs.
    pub active: Appearance,
    /// Appearance after the task finishes.
    pub finish: Appearance,
    /// Growth simulation on the active appearance, if any.
    pub growth: Option<GrowthSimulation>,
    /// Whether the detail fetch has completed.
    pub resolved: bool,
    /// Bindings waiting for this profile's details.
    pub(crate) waiters: Waiters,
}

impl AppearanceProfile {
    /// Create an unresolved shell for a freshly discovered id.
    pub fn shell(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            action: ProfileAction::Neutral,
            start: Appearance::default(),
            active: Appearance::default(),
            finish: Appearance::default(),
            growth: None,
            resolved: false,
            waiters: Waiters::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_first_letter() {
        assert_eq!(ProfileAction::parse("install"), Some(ProfileAction::Install));
        assert_eq!(ProfileAction::parse("Install"), Some(ProfileAction::Install));
        assert_eq!(ProfileAction::parse("R"), Some(ProfileAction::Remove));
        assert_eq!(ProfileAction::parse("temp"), Some(ProfileAction::Temporary));
        assert_eq!(ProfileAction::parse("MAINTENANCE"), Some(ProfileAction::Maintenance));
        assert_eq!(ProfileAction::parse("neutral"), Some(ProfileAction::Neutral));
        assert_eq!(ProfileAction::parse(""), None);
        assert_eq!(ProfileAction::parse("x"), None);
    }

    #[test]
    fn test_appearance_alpha() {
        let a = Appearance::default();
        assert_eq!(a.alpha(), 1.0);
        assert!(a.is_no_effect());

        let half = Appearance {
            transparency: Some(50.0),
            ..Default::default()
        };
        assert_eq!(half.alpha(), 0.5);

        let hidden = Appearance {
            visible: Some(false),
            transparency: Some(10.0),
            ..Default::default()
        };
        assert_eq!(hidden.alpha(), 0.0);
    }

    #[test]
    fn test_growth_orientation() {
        let g = GrowthSimulation {
            direction: GrowthDirection::BottomUp,
            percent_complete: false,
            invert: false,
        };
        assert_eq!(g.orientation(), DVec3::Z);

        let inverted = GrowthSimulation { invert: true, ..g };
        assert_eq!(inverted.orientation(), DVec3::NEG_Z);
    }
}
