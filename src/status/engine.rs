//! Pure status evaluation. No I/O, no clocks: callers assemble the inputs,
//! these functions decide status and warning codes.
//!
//! Status values: 0 = ManualOff (intent off or EA unable to trade),
//! 1 = Standby (slave ready but its master cluster is not), 2 = Connected.

use crate::models::{STATUS_CONNECTED, STATUS_MANUAL_OFF, STATUS_STANDBY};
use crate::wire::WarningCode;

/// Everything a master evaluation depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MasterInput {
    pub enabled_flag: bool,
    pub is_online: bool,
    pub is_trade_allowed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterEvaluation {
    pub status: i32,
    pub warning_codes: Vec<WarningCode>,
}

impl MasterEvaluation {
    pub fn is_connected(&self) -> bool {
        self.status == STATUS_CONNECTED
    }
}

/// The status of one master a slave is subscribed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterClusterEntry {
    pub master_account: String,
    pub status: i32,
}

/// Statuses of every master a slave belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterSnapshot {
    pub masters: Vec<MasterClusterEntry>,
}

impl ClusterSnapshot {
    pub fn new(masters: Vec<MasterClusterEntry>) -> Self {
        Self { masters }
    }

    pub fn is_empty(&self) -> bool {
        self.masters.is_empty()
    }

    pub fn all_connected(&self) -> bool {
        !self.masters.is_empty()
            && self
                .masters
                .iter()
                .all(|entry| entry.status == STATUS_CONNECTED)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlaveInput<'a> {
    pub enabled_flag: bool,
    pub is_online: bool,
    pub is_trade_allowed: bool,
    pub cluster: &'a ClusterSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlaveEvaluation {
    pub status: i32,
    /// Derived: the slave may open new positions only while Connected,
    /// which requires every master in its cluster to be Connected.
    pub allow_new_orders: bool,
    pub warning_codes: Vec<WarningCode>,
}

pub fn evaluate_master_status(input: MasterInput) -> MasterEvaluation {
    let (status, warning_codes) = if !input.enabled_flag {
        (STATUS_MANUAL_OFF, vec![WarningCode::MasterIntentOff])
    } else if !input.is_online {
        (STATUS_MANUAL_OFF, vec![WarningCode::MasterOffline])
    } else if !input.is_trade_allowed {
        (STATUS_MANUAL_OFF, vec![WarningCode::MasterAlgoOff])
    } else {
        (STATUS_CONNECTED, vec![])
    };

    MasterEvaluation {
        status,
        warning_codes,
    }
}

pub fn evaluate_slave_status(input: SlaveInput) -> SlaveEvaluation {
    let (status, mut warning_codes) = if !input.enabled_flag {
        (STATUS_MANUAL_OFF, vec![WarningCode::SlaveIntentOff])
    } else if !input.is_online {
        (STATUS_MANUAL_OFF, vec![WarningCode::SlaveOffline])
    } else if !input.is_trade_allowed {
        (STATUS_MANUAL_OFF, vec![WarningCode::SlaveAlgoOff])
    } else if input.cluster.is_empty() {
        (STATUS_STANDBY, vec![WarningCode::NoMasterAssigned])
    } else if input.cluster.all_connected() {
        (STATUS_CONNECTED, vec![])
    } else {
        let degraded = input
            .cluster
            .masters
            .iter()
            .filter(|entry| entry.status != STATUS_CONNECTED)
            .map(|entry| WarningCode::MasterUnavailable {
                master: entry.master_account.clone(),
            })
            .collect();
        (STATUS_STANDBY, degraded)
    };

    WarningCode::sort_by_priority(&mut warning_codes);
    let status_connected = status == STATUS_CONNECTED;

    SlaveEvaluation {
        status,
        allow_new_orders: status_connected,
        warning_codes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthy_master() -> MasterInput {
        MasterInput {
            enabled_flag: true,
            is_online: true,
            is_trade_allowed: true,
        }
    }

    fn cluster(statuses: &[(&str, i32)]) -> ClusterSnapshot {
        ClusterSnapshot::new(
            statuses
                .iter()
                .map(|(master, status)| MasterClusterEntry {
                    master_account: master.to_string(),
                    status: *status,
                })
                .collect(),
        )
    }

    fn healthy_slave(cluster: &ClusterSnapshot) -> SlaveInput<'_> {
        SlaveInput {
            enabled_flag: true,
            is_online: true,
            is_trade_allowed: true,
            cluster,
        }
    }

    #[test]
    fn master_connected_when_all_conditions_hold() {
        let result = evaluate_master_status(healthy_master());
        assert_eq!(result.status, STATUS_CONNECTED);
        assert!(result.warning_codes.is_empty());
    }

    #[test]
    fn master_intent_off_wins_over_liveness() {
        let result = evaluate_master_status(MasterInput {
            enabled_flag: false,
            is_online: false,
            is_trade_allowed: false,
        });
        assert_eq!(result.status, STATUS_MANUAL_OFF);
        assert_eq!(result.warning_codes, vec![WarningCode::MasterIntentOff]);
    }

    #[test]
    fn master_offline_and_algo_off_each_name_their_cause() {
        let offline = evaluate_master_status(MasterInput {
            is_online: false,
            ..healthy_master()
        });
        assert_eq!(offline.warning_codes, vec![WarningCode::MasterOffline]);

        let algo_off = evaluate_master_status(MasterInput {
            is_trade_allowed: false,
            ..healthy_master()
        });
        assert_eq!(algo_off.status, STATUS_MANUAL_OFF);
        assert_eq!(algo_off.warning_codes, vec![WarningCode::MasterAlgoOff]);
    }

    #[test]
    fn slave_blocking_causes_take_precedence_over_cluster() {
        let cluster = cluster(&[("M1", STATUS_CONNECTED)]);

        let intent_off = evaluate_slave_status(SlaveInput {
            enabled_flag: false,
            ..healthy_slave(&cluster)
        });
        assert_eq!(intent_off.status, STATUS_MANUAL_OFF);
        assert!(!intent_off.allow_new_orders);
        assert_eq!(intent_off.warning_codes, vec![WarningCode::SlaveIntentOff]);

        let offline = evaluate_slave_status(SlaveInput {
            is_online: false,
            ..healthy_slave(&cluster)
        });
        assert_eq!(offline.warning_codes, vec![WarningCode::SlaveOffline]);

        let algo_off = evaluate_slave_status(SlaveInput {
            is_trade_allowed: false,
            ..healthy_slave(&cluster)
        });
        assert_eq!(algo_off.warning_codes, vec![WarningCode::SlaveAlgoOff]);
    }

    #[test]
    fn slave_without_masters_stands_by() {
        let empty = ClusterSnapshot::default();
        let result = evaluate_slave_status(healthy_slave(&empty));
        assert_eq!(result.status, STATUS_STANDBY);
        assert!(!result.allow_new_orders);
        assert_eq!(result.warning_codes, vec![WarningCode::NoMasterAssigned]);
    }

    #[test]
    fn slave_connected_only_when_every_master_is() {
        let all_up = cluster(&[("M1", STATUS_CONNECTED), ("M2", STATUS_CONNECTED)]);
        let result = evaluate_slave_status(healthy_slave(&all_up));
        assert_eq!(result.status, STATUS_CONNECTED);
        assert!(result.allow_new_orders);
        assert!(result.warning_codes.is_empty());
    }

    #[test]
    fn degraded_masters_are_named_individually() {
        let mixed = cluster(&[
            ("M1", STATUS_CONNECTED),
            ("M2", STATUS_MANUAL_OFF),
            ("M3", STATUS_MANUAL_OFF),
        ]);
        let result = evaluate_slave_status(healthy_slave(&mixed));
        assert_eq!(result.status, STATUS_STANDBY);
        assert!(!result.allow_new_orders);
        assert_eq!(
            result.warning_codes,
            vec![
                WarningCode::MasterUnavailable {
                    master: "M2".to_string()
                },
                WarningCode::MasterUnavailable {
                    master: "M3".to_string()
                },
            ]
        );
    }
}
