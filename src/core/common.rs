//! Common data structures.

use crate::core::scenario::Scenario;

/// Index of a provider, in `[0, num_cips)`.
pub type PlayerId = usize;

/// A physical machine pooled into a coalition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PmInstance {
    /// The provider owning this PM.
    pub owner: PlayerId,
    /// PM type index.
    pub pm_type: usize,
    /// Whether the PM is powered on before the allocation is applied.
    pub is_on: bool,
}

/// A virtual machine pooled into a coalition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmInstance {
    /// The provider serving this VM.
    pub owner: PlayerId,
    /// VM type index.
    pub vm_type: usize,
}

/// The pooled resources of a coalition: the members' PMs and VMs concatenated
/// in ascending player order, grouped by type within each player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoalitionPool {
    pub pms: Vec<PmInstance>,
    pub vms: Vec<VmInstance>,
}

impl CoalitionPool {
    /// Builds the pool of the coalition formed by `members` (ascending).
    pub fn from_members(scenario: &Scenario, members: &[PlayerId]) -> Self {
        let mut pms = Vec::new();
        let mut vms = Vec::new();
        for &cip in members {
            let states = &scenario.cip_pm_power_states[cip];
            let mut state_idx = 0;
            for (pm_type, &count) in scenario.cip_num_pms[cip].iter().enumerate() {
                for _ in 0..count {
                    pms.push(PmInstance {
                        owner: cip,
                        pm_type,
                        is_on: states.get(state_idx).copied().unwrap_or(false),
                    });
                    state_idx += 1;
                }
            }
            for (vm_type, &count) in scenario.cip_num_vms[cip].iter().enumerate() {
                for _ in 0..count {
                    vms.push(VmInstance { owner: cip, vm_type });
                }
            }
        }
        Self { pms, vms }
    }

    /// Total hourly revenue of the members' VMs.
    pub fn revenue(scenario: &Scenario, members: &[PlayerId]) -> f64 {
        members
            .iter()
            .map(|&cip| {
                scenario.cip_revenues[cip]
                    .iter()
                    .zip(&scenario.cip_num_vms[cip])
                    .map(|(&r, &count)| r * count as f64)
                    .sum::<f64>()
            })
            .sum()
    }
}
