//! Weighted max-min fair sharing by progressive filling.
//!
//! Every unfixed variable grows at rate `level / penalty` as a common level
//! rises. When a shared constraint saturates, or a variable hits its bound,
//! the variables involved are fixed and the level keeps rising for the rest.
//! The result is max-min fair: no variable can be increased without
//! decreasing another one whose weighted share is not larger.

use crate::platform::SharingPolicy;

/// Relative slack when deciding that a constraint or bound is reached.
const SATURATION_TOLERANCE: f64 = 1e-9;

/// Capacity side of the system.
#[derive(Debug, Clone, Copy)]
pub struct ConstraintInput {
    pub capacity: f64,
    pub policy: SharingPolicy,
}

/// One consumer of the system.
#[derive(Debug, Clone)]
pub struct VariableInput {
    /// A variable with penalty `p` receives `1/p` shares; `p <= 0` is suspended.
    pub penalty: f64,
    pub bound: f64,
    /// `(constraint index, consumption per unit of rate)`
    pub usages: Vec<(usize, f64)>,
}

/// Returns the rate of every variable, in input order.
///
/// Variables constrained by nothing end up with an infinite rate.
pub fn solve_max_min(constraints: &[ConstraintInput], variables: &[VariableInput]) -> Vec<f64> {
    let count = variables.len();
    let mut rates = vec![0.0; count];
    let mut fixed = vec![false; count];
    let mut bounds: Vec<f64> = variables.iter().map(|variable| variable.bound).collect();
    let mut available: Vec<f64> = constraints
        .iter()
        .map(|constraint| constraint.capacity.max(0.0))
        .collect();

    for (index, variable) in variables.iter().enumerate() {
        if variable.penalty <= 0.0 {
            fixed[index] = true;
            continue;
        }
        // A fat pipe only caps each flow individually.
        for &(constraint, coefficient) in &variable.usages {
            if coefficient > 0.0 && constraints[constraint].policy == SharingPolicy::FatPipe {
                bounds[index] = bounds[index].min(constraints[constraint].capacity.max(0.0) / coefficient);
            }
        }
    }

    let is_shared = |constraint: usize| constraints[constraint].policy == SharingPolicy::Shared;

    while fixed.iter().any(|done| !done) {
        let mut weights = vec![0.0; constraints.len()];
        for (index, variable) in variables.iter().enumerate() {
            if fixed[index] {
                continue;
            }
            for &(constraint, coefficient) in &variable.usages {
                if coefficient > 0.0 && is_shared(constraint) {
                    weights[constraint] += coefficient / variable.penalty;
                }
            }
        }

        let constraint_levels: Vec<f64> = weights
            .iter()
            .zip(&available)
            .map(|(&weight, &left)| {
                if weight > 0.0 {
                    left / weight
                } else {
                    f64::INFINITY
                }
            })
            .collect();

        let bound_level = |index: usize| bounds[index] * variables[index].penalty;

        let mut level = constraint_levels
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min);
        for index in (0..count).filter(|&index| !fixed[index]) {
            level = level.min(bound_level(index));
        }

        if level.is_infinite() {
            let open: Vec<usize> = (0..count).filter(|&index| !fixed[index]).collect();
            for index in open {
                rates[index] = f64::INFINITY;
                fixed[index] = true;
            }
            break;
        }

        let threshold = level * (1.0 + SATURATION_TOLERANCE) + f64::MIN_POSITIVE;
        let saturated: Vec<bool> = constraint_levels
            .iter()
            .map(|&constraint_level| constraint_level <= threshold)
            .collect();

        let reached: Vec<usize> = (0..count)
            .filter(|&index| !fixed[index])
            .filter(|&index| {
                bound_level(index) <= threshold
                    || variables[index].usages.iter().any(|&(constraint, coefficient)| {
                        coefficient > 0.0 && is_shared(constraint) && saturated[constraint]
                    })
            })
            .collect();

        if reached.is_empty() {
            break;
        }

        for index in reached {
            let variable = &variables[index];
            let rate = (level / variable.penalty).min(bounds[index]);
            rates[index] = rate;
            fixed[index] = true;
            for &(constraint, coefficient) in &variable.usages {
                if coefficient > 0.0 && is_shared(constraint) {
                    available[constraint] = (available[constraint] - coefficient * rate).max(0.0);
                }
            }
        }
    }

    rates
}
