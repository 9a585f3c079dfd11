mod aggregator;

pub use aggregator::MetricsAggregator;
