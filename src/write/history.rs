//! Entity histories
//!
//! Input boxes are grouped by chain, then id. Each id's history is sorted by
//! block number; the sort is stable and only the last write of a block is
//! kept, so later writes for the same block win.

use std::collections::BTreeMap;

use crate::entity::EntityBox;

/// Writes of one id on one chain, in block order
#[derive(Debug, Clone, PartialEq)]
pub struct History {
    pub chain: String,
    pub boxes: Vec<EntityBox>,
}

impl History {
    pub fn id_key(&self) -> String {
        self.boxes.first().map(EntityBox::id_key).unwrap_or_default()
    }

    pub fn first(&self) -> Option<&EntityBox> {
        self.boxes.first()
    }
}

/// Group boxes into histories, ordered by chain then id
pub fn partition(boxes: Vec<EntityBox>) -> Vec<History> {
    let mut grouped: BTreeMap<(String, String), Vec<EntityBox>> = BTreeMap::new();
    for entity_box in boxes {
        grouped
            .entry((entity_box.chain.clone(), entity_box.id_key()))
            .or_default()
            .push(entity_box);
    }
    grouped
        .into_iter()
        .map(|((chain, _), mut boxes)| {
            boxes.sort_by_key(|b| b.block_number);
            let mut deduped: Vec<EntityBox> = Vec::with_capacity(boxes.len());
            for entity_box in boxes {
                match deduped.last_mut() {
                    Some(last) if last.block_number == entity_box.block_number => *last = entity_box,
                    _ => deduped.push(entity_box),
                }
            }
            History { chain, boxes: deduped }
        })
        .collect()
}

/// Split histories into flushes of at most `batch_size` ids, one chain each
pub fn batches(histories: Vec<History>, batch_size: usize) -> Vec<Vec<History>> {
    let mut out: Vec<Vec<History>> = Vec::new();
    for history in histories {
        match out.last_mut() {
            Some(batch)
                if batch.len() < batch_size.max(1)
                    && batch.first().map_or(false, |h| h.chain == history.chain) =>
            {
                batch.push(history)
            }
            _ => out.push(vec![history]),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Value;

    fn write(id: &str, chain: &str, block: u64, a: i32) -> EntityBox {
        EntityBox::new("Pool", id, chain, block).with_field("a", a)
    }

    #[test]
    fn test_histories_sorted_and_deduped() {
        let histories = partition(vec![
            write("x", "eth", 20, 1),
            write("y", "eth", 5, 1),
            write("x", "eth", 10, 2),
            write("x", "eth", 20, 3),
            write("x", "base", 1, 4),
        ]);
        assert_eq!(histories.len(), 3);
        assert_eq!(histories[0].chain, "base");
        let x = &histories[1];
        assert_eq!(x.id_key(), "x");
        let blocks: Vec<u64> = x.boxes.iter().map(|b| b.block_number).collect();
        assert_eq!(blocks, vec![10, 20]);
        assert_eq!(x.boxes[1].get("a"), &Value::Int(3));
    }

    #[test]
    fn test_batches_never_mix_chains() {
        let histories = partition(vec![
            write("a", "base", 1, 1),
            write("a", "eth", 1, 1),
            write("b", "eth", 1, 1),
            write("c", "eth", 1, 1),
        ]);
        let batches = batches(histories, 2);
        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![1, 2, 1]);
        assert!(batches[1].iter().all(|h| h.chain == "eth"));
    }
}
