//! Property tests for stats aggregation and cost production

use fuzz_harness::prelude::*;
use relay_stats::{RelayStatsPing, RelayStatsUpdate, StatsDatabase, StatsEntryRelay, HISTORY_SIZE, TOTAL_LOSS_PERCENT};
use route_matrix::{Relay, UNREACHABLE};

fn relays(n: u64) -> Vec<Relay> {
    (1..=n)
        .map(|id| Relay::new(id, format!("r{id}"), format!("10.3.0.{id}:40000").parse().unwrap()))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_aggregate_is_worst_recent_sample(samples in ping_samples(400)) {
        let mut entry = StatsEntryRelay::new();
        for (rtt, jitter, pl) in &samples {
            entry.add_sample(*rtt, *jitter, *pl);
        }

        let window = &samples[samples.len().saturating_sub(HISTORY_SIZE)..];
        let valid: Vec<_> = window.iter().filter(|s| s.2 <= TOTAL_LOSS_PERCENT).collect();
        let worst_loss = window.iter().map(|s| s.2).fold(f32::MIN, f32::max);
        prop_assert_eq!(entry.packet_loss, worst_loss);

        if valid.is_empty() {
            prop_assert!(!entry.has_sample());
        } else {
            let worst_rtt = valid.iter().map(|s| s.0).fold(f32::MIN, f32::max);
            let worst_jitter = valid.iter().map(|s| s.1).fold(f32::MIN, f32::max);
            prop_assert_eq!(entry.rtt, worst_rtt);
            prop_assert_eq!(entry.jitter, worst_jitter);
        }
    }

    #[test]
    fn prop_cost_matrix_matches_samples(
        stats in proptest::collection::vec(link_stats(), 12),
        reported in proptest::collection::vec(any::<bool>(), 12),
    ) {
        // 4 relays, 12 directional links
        let db = StatsDatabase::new();
        let mut link = 0;
        for source in 1..=4u64 {
            let mut pings = Vec::new();
            for dest in (1..=4u64).filter(|d| *d != source) {
                if reported[link] {
                    let (rtt, jitter, packet_loss) = stats[link];
                    pings.push(RelayStatsPing { relay_id: dest, rtt, jitter, packet_loss });
                }
                link += 1;
            }
            db.process_stats(&RelayStatsUpdate { relay_id: source, pings });
        }

        let matrix = db.get_cost_matrix(relays(4), 10.0, 1.0);
        for i in 0..4usize {
            for j in 0..i {
                let (a, b) = (i as u64 + 1, j as u64 + 1);
                let cost = matrix.cost(i, j);
                match db.get_sample(a, b) {
                    Some(s) if s.jitter <= 10.0 && s.packet_loss <= 1.0 => {
                        prop_assert_eq!(cost, (s.rtt + s.jitter).floor() as i32);
                    }
                    _ => prop_assert_eq!(cost, UNREACHABLE),
                }
            }
        }
    }
}
