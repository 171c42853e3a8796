use std::fmt;

use serde::{Deserialize, Serialize};

/// The zk-prover counter vector bounding what a single batch may consume.
///
/// One dimension per ROM counter, plus cumulative gas. All components are
/// budgeted independently; a batch closes when any of them runs low.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZKCounters {
    pub gas_used: u64,
    pub keccak_hashes: u64,
    pub poseidon_hashes: u64,
    pub poseidon_paddings: u64,
    pub mem_aligns: u64,
    pub arithmetics: u64,
    pub binaries: u64,
    pub steps: u64,
    pub sha256_hashes: u64,
}

/// Resource vector of a batch: the zk counters plus the size in bytes of the
/// batch L2 data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResources {
    pub zk_counters: ZKCounters,
    pub bytes: u64,
}

/// Names of the budgeted dimensions, rendered with the constraint-style
/// labels used in logs and closing reasons.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceName {
    BatchBytesSize,
    CumulativeGasUsed,
    KeccakHashes,
    PoseidonHashes,
    PoseidonPaddings,
    MemAligns,
    Arithmetics,
    Binaries,
    Steps,
    Sha256Hashes,
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceName::BatchBytesSize => "MaxBatchBytesSize",
            ResourceName::CumulativeGasUsed => "MaxCumulativeGasUsed",
            ResourceName::KeccakHashes => "MaxKeccakHashes",
            ResourceName::PoseidonHashes => "MaxPoseidonHashes",
            ResourceName::PoseidonPaddings => "MaxPoseidonPaddings",
            ResourceName::MemAligns => "MaxMemAligns",
            ResourceName::Arithmetics => "MaxArithmetics",
            ResourceName::Binaries => "MaxBinaries",
            ResourceName::Steps => "MaxSteps",
            ResourceName::Sha256Hashes => "MaxSHA256Hashes",
        };
        f.write_str(name)
    }
}

/// Subtracting a resource vector would drive a component below zero.
///
/// The operand is left untouched when this is returned, so callers can probe
/// with a speculative usage and fall back to closing the batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("batch resource {0} exceeds the remaining budget")]
pub struct ResourceOverflow(pub ResourceName);

impl BatchResources {
    /// Component-wise subtraction, all-or-nothing: if any component of
    /// `other` exceeds the corresponding component of `self`, `self` is left
    /// unmodified and the first overflowing resource is reported.
    pub fn sub(&mut self, other: &BatchResources) -> Result<(), ResourceOverflow> {
        let counters = &self.zk_counters;
        let used = &other.zk_counters;

        let overflowed = [
            (counters.gas_used < used.gas_used, ResourceName::CumulativeGasUsed),
            (counters.keccak_hashes < used.keccak_hashes, ResourceName::KeccakHashes),
            (counters.poseidon_hashes < used.poseidon_hashes, ResourceName::PoseidonHashes),
            (
                counters.poseidon_paddings < used.poseidon_paddings,
                ResourceName::PoseidonPaddings,
            ),
            (counters.mem_aligns < used.mem_aligns, ResourceName::MemAligns),
            (counters.arithmetics < used.arithmetics, ResourceName::Arithmetics),
            (counters.binaries < used.binaries, ResourceName::Binaries),
            (counters.steps < used.steps, ResourceName::Steps),
            (counters.sha256_hashes < used.sha256_hashes, ResourceName::Sha256Hashes),
            (self.bytes < other.bytes, ResourceName::BatchBytesSize),
        ]
        .into_iter()
        .find_map(|(overflow, name)| overflow.then_some(name));

        if let Some(name) = overflowed {
            return Err(ResourceOverflow(name));
        }

        self.zk_counters.gas_used -= used.gas_used;
        self.zk_counters.keccak_hashes -= used.keccak_hashes;
        self.zk_counters.poseidon_hashes -= used.poseidon_hashes;
        self.zk_counters.poseidon_paddings -= used.poseidon_paddings;
        self.zk_counters.mem_aligns -= used.mem_aligns;
        self.zk_counters.arithmetics -= used.arithmetics;
        self.zk_counters.binaries -= used.binaries;
        self.zk_counters.steps -= used.steps;
        self.zk_counters.sha256_hashes -= used.sha256_hashes;
        self.bytes -= other.bytes;

        Ok(())
    }

    /// Returns the first resource whose remaining amount is at or below
    /// `pct` percent of its configured maximum.
    ///
    /// The check order is part of the contract: it decides which resource a
    /// `BatchAlmostFull` closing reason names. Poseidon hashes are bounded
    /// by `sub` but carry no early-close threshold.
    pub fn below_threshold(
        &self,
        constraints: &BatchConstraints,
        pct: u64,
    ) -> Option<ResourceName> {
        let threshold = |max: u64| max * pct / 100;
        let counters = &self.zk_counters;

        if self.bytes <= threshold(constraints.max_batch_bytes_size) {
            Some(ResourceName::BatchBytesSize)
        } else if counters.steps <= threshold(constraints.max_steps) {
            Some(ResourceName::Steps)
        } else if counters.poseidon_paddings <= threshold(constraints.max_poseidon_paddings) {
            Some(ResourceName::PoseidonPaddings)
        } else if counters.binaries <= threshold(constraints.max_binaries) {
            Some(ResourceName::Binaries)
        } else if counters.keccak_hashes <= threshold(constraints.max_keccak_hashes) {
            Some(ResourceName::KeccakHashes)
        } else if counters.arithmetics <= threshold(constraints.max_arithmetics) {
            Some(ResourceName::Arithmetics)
        } else if counters.mem_aligns <= threshold(constraints.max_mem_aligns) {
            Some(ResourceName::MemAligns)
        } else if counters.gas_used <= threshold(constraints.max_cumulative_gas_used) {
            Some(ResourceName::CumulativeGasUsed)
        } else if counters.sha256_hashes <= threshold(constraints.max_sha256_hashes) {
            Some(ResourceName::Sha256Hashes)
        } else {
            None
        }
    }
}

/// Configured maxima for a batch. Immutable for the life of the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConstraints {
    pub max_txs_per_batch: u64,
    pub max_batch_bytes_size: u64,
    pub max_cumulative_gas_used: u64,
    pub max_keccak_hashes: u64,
    pub max_poseidon_hashes: u64,
    pub max_poseidon_paddings: u64,
    pub max_mem_aligns: u64,
    pub max_arithmetics: u64,
    pub max_binaries: u64,
    pub max_steps: u64,
    pub max_sha256_hashes: u64,
}

impl BatchConstraints {
    /// The full budget a freshly opened batch starts with.
    pub fn max_resources(&self) -> BatchResources {
        BatchResources {
            zk_counters: ZKCounters {
                gas_used: self.max_cumulative_gas_used,
                keccak_hashes: self.max_keccak_hashes,
                poseidon_hashes: self.max_poseidon_hashes,
                poseidon_paddings: self.max_poseidon_paddings,
                mem_aligns: self.max_mem_aligns,
                arithmetics: self.max_arithmetics,
                binaries: self.max_binaries,
                steps: self.max_steps,
                sha256_hashes: self.max_sha256_hashes,
            },
            bytes: self.max_batch_bytes_size,
        }
    }

    /// Resources consumed so far, given what remains.
    ///
    /// Callers guarantee `remaining <= max_resources()` component-wise; the
    /// budget can only shrink through [`BatchResources::sub`].
    pub fn used_resources(&self, remaining: &BatchResources) -> BatchResources {
        let max = self.max_resources();
        debug_assert!(remaining.bytes <= max.bytes);
        BatchResources {
            zk_counters: ZKCounters {
                gas_used: max.zk_counters.gas_used - remaining.zk_counters.gas_used,
                keccak_hashes: max.zk_counters.keccak_hashes - remaining.zk_counters.keccak_hashes,
                poseidon_hashes: max.zk_counters.poseidon_hashes
                    - remaining.zk_counters.poseidon_hashes,
                poseidon_paddings: max.zk_counters.poseidon_paddings
                    - remaining.zk_counters.poseidon_paddings,
                mem_aligns: max.zk_counters.mem_aligns - remaining.zk_counters.mem_aligns,
                arithmetics: max.zk_counters.arithmetics - remaining.zk_counters.arithmetics,
                binaries: max.zk_counters.binaries - remaining.zk_counters.binaries,
                steps: max.zk_counters.steps - remaining.zk_counters.steps,
                sha256_hashes: max.zk_counters.sha256_hashes - remaining.zk_counters.sha256_hashes,
            },
            bytes: max.bytes - remaining.bytes,
        }
    }
}
