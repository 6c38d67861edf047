use super::layout::GridLayout;
use crate::common::DomainResult;

/// Port the fleet depends on for loading grid layouts.
/// Implementations (adapters) provide filesystem or network-backed sources.
pub trait GridLayoutSource: Send + Sync {
    fn load_layout(&self, name: &str) -> DomainResult<GridLayout>;
}
