//! Crossover detection between two series sampled on consecutive rows.
//!
//! One side of each comparison is non-strict so a value sitting exactly on
//! the other series counts once: up = `prev_a <= prev_b && cur_a > cur_b`.

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cross {
    pub up: bool,
    pub down: bool,
}

/// Crossing of `a` against `b`; any unknown operand means no crossover.
pub fn cross(prev_a: Option<f64>, prev_b: Option<f64>, cur_a: Option<f64>, cur_b: Option<f64>) -> Cross {
    match (prev_a, prev_b, cur_a, cur_b) {
        (Some(pa), Some(pb), Some(ca), Some(cb)) => Cross {
            up: pa <= pb && ca > cb,
            down: pa >= pb && ca < cb,
        },
        _ => Cross::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tie_break_counts_once() {
        // a touches b, then moves above: one up-cross, on the second step.
        let c1 = cross(Some(9.0), Some(10.0), Some(10.0), Some(10.0));
        assert_eq!(c1, Cross::default());
        let c2 = cross(Some(10.0), Some(10.0), Some(11.0), Some(10.0));
        assert!(c2.up && !c2.down);
    }

    #[test]
    fn test_unknown_operand_blocks() {
        assert_eq!(cross(None, Some(1.0), Some(2.0), Some(1.0)), Cross::default());
        assert_eq!(cross(Some(0.0), Some(1.0), Some(2.0), None), Cross::default());
    }

    #[test]
    fn test_down_cross() {
        let c = cross(Some(5.0), Some(4.0), Some(3.0), Some(4.0));
        assert!(c.down && !c.up);
    }
}
