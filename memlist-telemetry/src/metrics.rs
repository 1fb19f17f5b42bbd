//! ## memlist-telemetry::metrics
//! **Prometheus exporter for allocator and list activity**
//!
//! Allocator counters are absolute values taken from a `StatsSnapshot`, so
//! they are exported as gauges and overwritten on every `observe`.

use memlist_core::alloc::{BlockInfo, StatsSnapshot};
use prometheus::{Encoder, Histogram, HistogramOpts, IntGauge, IntGaugeVec, Opts, Registry};

#[derive(Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    operations: IntGaugeVec,
    bytes_in_use: IntGauge,
    bytes_free: IntGauge,
    blocks: IntGauge,
    free_blocks: IntGauge,
    largest_free_block: IntGauge,
    pub insert_latency: Histogram,
}

impl MetricsRecorder {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let operations = IntGaugeVec::new(
            Opts::new("memlist_allocator_operations", "Allocator operations by kind"),
            &["op"],
        )?;
        let bytes_in_use =
            IntGauge::new("memlist_arena_bytes_in_use", "Arena bytes in InUse blocks")?;
        let bytes_free = IntGauge::new("memlist_arena_bytes_free", "Arena bytes in Free blocks")?;
        let blocks = IntGauge::new("memlist_arena_blocks", "Block descriptors in the table")?;
        let free_blocks = IntGauge::new("memlist_arena_free_blocks", "Free block descriptors")?;
        let largest_free_block = IntGauge::new(
            "memlist_arena_largest_free_block_bytes",
            "Largest allocation the arena can currently serve",
        )?;
        let insert_latency = Histogram::with_opts(
            HistogramOpts::new("memlist_list_insert_latency_ns", "List insert latency")
                .buckets(vec![1_000.0, 10_000.0, 100_000.0, 1_000_000.0]),
        )?;

        registry.register(Box::new(operations.clone()))?;
        registry.register(Box::new(bytes_in_use.clone()))?;
        registry.register(Box::new(bytes_free.clone()))?;
        registry.register(Box::new(blocks.clone()))?;
        registry.register(Box::new(free_blocks.clone()))?;
        registry.register(Box::new(largest_free_block.clone()))?;
        registry.register(Box::new(insert_latency.clone()))?;

        Ok(Self {
            registry,
            operations,
            bytes_in_use,
            bytes_free,
            blocks,
            free_blocks,
            largest_free_block,
            insert_latency,
        })
    }

    /// Updates every gauge from an allocator snapshot and block table.
    pub fn observe(&self, stats: &StatsSnapshot, table: &[BlockInfo]) {
        let ops = [
            ("alloc", stats.allocations),
            ("alloc_failed", stats.failed_allocations),
            ("free", stats.frees),
            ("free_ignored", stats.ignored_frees),
            ("resize_in_place", stats.resizes_in_place),
            ("relocate", stats.relocations),
            ("resize_failed", stats.failed_resizes),
            ("split", stats.splits),
            ("merge", stats.merges),
        ];
        for (op, value) in ops {
            self.operations.with_label_values(&[op]).set(value as i64);
        }

        let (free, in_use): (Vec<&BlockInfo>, Vec<&BlockInfo>) =
            table.iter().partition(|block| block.is_free());
        self.bytes_in_use
            .set(in_use.iter().map(|b| b.len).sum::<usize>() as i64);
        self.bytes_free
            .set(free.iter().map(|b| b.len).sum::<usize>() as i64);
        self.blocks.set(table.len() as i64);
        self.free_blocks.set(free.len() as i64);
        self.largest_free_block
            .set(free.iter().map(|b| b.len).max().unwrap_or(0) as i64);
    }

    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|err| prometheus::Error::Msg(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memlist_core::alloc::Allocator;

    #[test]
    fn test_observe_allocator() {
        let allocator = Allocator::init(128).unwrap();
        let a = allocator.alloc(32).unwrap();
        allocator.alloc(32).unwrap();
        allocator.free(a);

        let metrics = MetricsRecorder::new().unwrap();
        metrics.observe(&allocator.stats(), &allocator.blocks());

        assert_eq!(metrics.bytes_in_use.get(), 32);
        assert_eq!(metrics.bytes_free.get(), 96);
        assert_eq!(metrics.free_blocks.get(), 2);
        assert_eq!(metrics.largest_free_block.get(), 64);
        assert_eq!(metrics.operations.with_label_values(&["alloc"]).get(), 2);

        let text = metrics.gather_metrics().unwrap();
        assert!(text.contains("memlist_arena_bytes_in_use 32"));
        assert!(text.contains("memlist_allocator_operations{op=\"free\"} 1"));
    }

    #[test]
    fn test_insert_latency_histogram() {
        let metrics = MetricsRecorder::new().unwrap();
        metrics.insert_latency.observe(5_000.0);
        assert_eq!(metrics.insert_latency.get_sample_count(), 1);
    }
}
