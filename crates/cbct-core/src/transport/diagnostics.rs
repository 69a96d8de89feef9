use tracing::{debug, info};

/// Aggregate counts of discarded particles and interactions.
///
/// Discards are expected and frequent, so they are only ever reported as
/// totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportDiagnostics {
    pub roulette_kills: u64,
    pub zero_splits: u64,
    pub latch_truncations: u64,
    pub delta_rejections: u64,
    pub photo_absorptions: u64,
    pub rayleigh: u64,
    pub compton: u64,
    pub rejected_compton: u64,
    pub escaped: u64,
    pub below_cutoff: u64,
}

impl TransportDiagnostics {
    pub fn merge(&mut self, other: &Self) {
        self.roulette_kills += other.roulette_kills;
        self.zero_splits += other.zero_splits;
        self.latch_truncations += other.latch_truncations;
        self.delta_rejections += other.delta_rejections;
        self.photo_absorptions += other.photo_absorptions;
        self.rayleigh += other.rayleigh;
        self.compton += other.compton;
        self.rejected_compton += other.rejected_compton;
        self.escaped += other.escaped;
        self.below_cutoff += other.below_cutoff;
    }

    pub fn log_batch(&self, batch: usize) {
        debug!(
            batch,
            roulette_kills = self.roulette_kills,
            zero_splits = self.zero_splits,
            latch_truncations = self.latch_truncations,
            delta_rejections = self.delta_rejections,
            "transport discards"
        );
    }

    pub fn log_summary(&self) {
        info!(
            rayleigh = self.rayleigh,
            compton = self.compton,
            rejected_compton = self.rejected_compton,
            photo = self.photo_absorptions,
            escaped = self.escaped,
            below_cutoff = self.below_cutoff,
            "interaction totals"
        );
        info!(
            roulette_kills = self.roulette_kills,
            zero_splits = self.zero_splits,
            latch_truncations = self.latch_truncations,
            delta_rejections = self.delta_rejections,
            "variance reduction discards"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::TransportDiagnostics;

    #[test]
    fn merge_adds_every_counter() {
        let mut total = TransportDiagnostics {
            roulette_kills: 1,
            compton: 2,
            ..TransportDiagnostics::default()
        };
        let other = TransportDiagnostics {
            roulette_kills: 3,
            delta_rejections: 4,
            escaped: 5,
            ..TransportDiagnostics::default()
        };
        total.merge(&other);
        assert_eq!(total.roulette_kills, 4);
        assert_eq!(total.compton, 2);
        assert_eq!(total.delta_rejections, 4);
        assert_eq!(total.escaped, 5);
    }
}
