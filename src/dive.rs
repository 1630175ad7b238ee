//! Gas planning numbers printed on the label.

/// Working ppO2 limit (bar) for bottom gases.
pub const PPO2_MAX: f32 = 1.2;

/// ppO2 limit (bar) for deco gases.
pub const PPO2_MAX_DECO: f32 = 1.6;

/// From this O2 percentage on, a mix is treated as a deco gas.
pub const DECO_O2_THRESHOLD: f32 = 40.0;

/// Nitrogen fraction of air.
const AIR_N2: f32 = 0.79;

/// Maximum operating depth in meters of sea water for `o2_pct` percent oxygen.
///
/// `MOD = ((ppO2max / fO2) - 1) * 10`, never negative. Out of range inputs give 0.
pub fn max_operating_depth(o2_pct: f32) -> f32 {
    if o2_pct <= 0.0 || o2_pct > 100.0 {
        return 0.0;
    }

    let limit = if o2_pct >= DECO_O2_THRESHOLD {
        PPO2_MAX_DECO
    } else {
        PPO2_MAX
    };

    ((limit / (o2_pct / 100.0) - 1.0) * 10.0).max(0.0)
}

/// Equivalent narcotic depth in meters for a dive to `depth_m` on the given mix.
///
/// Oxygen is treated as non-narcotic: `END = (depth + 10) * (fN2 / 0.79) - 10`, never negative.
pub fn equivalent_narcotic_depth(depth_m: f32, o2_pct: f32, he_pct: f32) -> f32 {
    if depth_m <= 0.0 {
        return 0.0;
    }

    let n2 = 1.0 - (o2_pct + he_pct) / 100.0;

    ((depth_m + 10.0) * (n2 / AIR_N2) - 10.0).max(0.0)
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Not breathable at the surface.
    Hypoxic,
    Air,
    Nitrox,
    /// Deco gas (more than 40 % O2).
    OxygenRich,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Narcosis {
    Low,
    Moderate,
    High,
}

/// Oxygen and helium percentages of a breathing gas.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GasMix {
    pub o2_pct: f32,
    pub he_pct: f32,
}

impl GasMix {
    pub fn new(o2_pct: f32, he_pct: f32) -> Self {
        Self { o2_pct, he_pct }
    }

    pub fn mod_m(&self) -> f32 {
        max_operating_depth(self.o2_pct)
    }

    /// END at this mix's MOD.
    pub fn end_m(&self) -> f32 {
        equivalent_narcotic_depth(self.mod_m(), self.o2_pct, self.he_pct)
    }

    pub fn classification(&self) -> Classification {
        match self.o2_pct {
            o2 if o2 > 40.0 => Classification::OxygenRich,
            o2 if o2 > 21.0 => Classification::Nitrox,
            o2 if o2 > 20.7 => Classification::Air,
            _ => Classification::Hypoxic,
        }
    }

    pub fn narcosis(&self) -> Narcosis {
        match self.end_m() {
            end if end > 40.0 => Narcosis::High,
            end if end > 30.0 => Narcosis::Moderate,
            _ => Narcosis::Low,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 0.05
    }

    #[test]
    fn mod_for_common_mixes() {
        assert!(close(max_operating_depth(21.0), 47.1));
        assert!(close(max_operating_depth(32.0), 27.5));
        assert!(close(max_operating_depth(39.9), 20.1));
        assert!(close(max_operating_depth(40.0), 30.0));
        assert!(close(max_operating_depth(100.0), 6.0));
    }

    #[test]
    fn mod_out_of_range() {
        assert_eq!(max_operating_depth(0.0), 0.0);
        assert_eq!(max_operating_depth(-5.0), 0.0);
        assert_eq!(max_operating_depth(100.5), 0.0);
    }

    #[test]
    fn end_uses_nitrogen_fraction() {
        // Air is its own reference.
        assert!(close(equivalent_narcotic_depth(30.0, 21.0, 0.0), 30.0));

        // Trimix 21/35 at 40 m.
        assert!(close(equivalent_narcotic_depth(40.0, 21.0, 35.0), 17.85));

        assert_eq!(equivalent_narcotic_depth(0.0, 21.0, 0.0), 0.0);
        assert_eq!(equivalent_narcotic_depth(10.0, 18.0, 80.0), 0.0);
    }

    #[test]
    fn classification_thresholds() {
        assert_eq!(GasMix::new(18.0, 45.0).classification(), Classification::Hypoxic);
        assert_eq!(GasMix::new(20.7, 0.0).classification(), Classification::Hypoxic);
        assert_eq!(GasMix::new(20.9, 0.0).classification(), Classification::Air);
        assert_eq!(GasMix::new(32.0, 0.0).classification(), Classification::Nitrox);
        assert_eq!(GasMix::new(50.0, 0.0).classification(), Classification::OxygenRich);
    }

    #[test]
    fn end_at_mod() {
        let air = GasMix::new(21.0, 0.0);

        assert!(close(air.end_m(), air.mod_m()));
        assert_eq!(air.narcosis(), Narcosis::High);
        assert_eq!(GasMix::new(21.0, 35.0).narcosis(), Narcosis::Low);
    }
}
