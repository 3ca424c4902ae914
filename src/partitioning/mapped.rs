//! Explicit, user-supplied block ownership.

use super::{PartitionMap, Partitioner, check_inputs};
use crate::data::metadata::MeshMetadata;
use crate::sensei_error::SenseiError;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappedPartitioner {
    /// `block_owner[b]` is the rank receiving block `b`.
    block_owner: Vec<usize>,
}

impl MappedPartitioner {
    pub fn new(block_owner: Vec<usize>) -> Self {
        Self { block_owner }
    }

    /// Parse a whitespace or comma separated owner list.
    pub fn parse(text: &str) -> Result<Self, SenseiError> {
        let block_owner = text
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<usize>().map_err(|e| {
                    SenseiError::InvalidConfiguration(format!("block owner `{s}`: {e}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        if block_owner.is_empty() {
            return Err(SenseiError::InvalidConfiguration(
                "empty block owner list".into(),
            ));
        }
        Ok(Self { block_owner })
    }

    pub fn block_owner(&self) -> &[usize] {
        &self.block_owner
    }
}

impl Partitioner for MappedPartitioner {
    fn name(&self) -> &'static str {
        "mapped"
    }

    fn partition(
        &self,
        remote: &MeshMetadata,
        local: &MeshMetadata,
    ) -> Result<PartitionMap, SenseiError> {
        let (n, size) = check_inputs(self.name(), remote, local)?;
        if self.block_owner.len() != n {
            return Err(SenseiError::InvalidConfiguration(format!(
                "mapping lists {} owners for {n} blocks",
                self.block_owner.len()
            )));
        }
        PartitionMap::new(self.block_owner.clone(), size).map_err(|e| match e {
            SenseiError::InvalidMetadata(msg) => SenseiError::InvalidConfiguration(msg),
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partitioning::consumer_view;

    fn remote(n: usize) -> MeshMetadata {
        MeshMetadata {
            num_blocks: n,
            ..MeshMetadata::default()
        }
    }

    #[test]
    fn explicit_owners_are_used() {
        let p = MappedPartitioner::parse("1, 0 1").unwrap();
        let map = p.partition(&remote(3), &consumer_view(2)).unwrap();
        assert_eq!(map.owners(), &[1, 0, 1]);
    }

    #[test]
    fn mapping_must_fit_mesh_and_world() {
        let p = MappedPartitioner::new(vec![0, 3]);
        assert!(matches!(
            p.partition(&remote(2), &consumer_view(2)),
            Err(SenseiError::InvalidConfiguration(_))
        ));
        assert!(p.partition(&remote(3), &consumer_view(4)).is_err());
        assert!(MappedPartitioner::parse("0 x").is_err());
        assert!(MappedPartitioner::parse(" ").is_err());
    }
}
