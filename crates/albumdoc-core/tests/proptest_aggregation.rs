use albumdoc_core::aggregator::{AlbumAggregator, Batch, BatchHandler, InboundEvent, TimerPolicy};
use async_trait::async_trait;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const QUIESCENCE: Duration = Duration::from_millis(50);

#[derive(Default)]
struct Collect {
    batches: Mutex<Vec<Batch<usize>>>,
}

#[async_trait]
impl BatchHandler<usize> for Collect {
    async fn handle(&self, batch: Batch<usize>) -> anyhow::Result<()> {
        self.batches
            .lock()
            .map_err(|e| anyhow::anyhow!("{e}"))?
            .push(batch);
        Ok(())
    }
}

/// Submit every message at once, let all deadlines pass, return what was emitted
fn run(groups: &[Option<u8>], policy: TimerPolicy) -> (Vec<Batch<usize>>, usize) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .expect("runtime");

    runtime.block_on(async {
        let collect = Arc::new(Collect::default());
        let aggregator = AlbumAggregator::new(QUIESCENCE, policy, collect.clone());

        for (index, group) in groups.iter().enumerate() {
            let event = match group {
                Some(g) => InboundEvent::grouped(1, 1, format!("g{g}"), index),
                None => InboundEvent::single(1, 1, index),
            };
            aggregator.submit(event).await.expect("submit");
        }

        tokio::time::sleep(QUIESCENCE * 4).await;
        let batches = std::mem::take(&mut *collect.batches.lock().expect("lock"));
        (batches, aggregator.pending_groups())
    })
}

fn expected_groups(groups: &[Option<u8>]) -> BTreeMap<String, Vec<usize>> {
    let mut expected: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (index, group) in groups.iter().enumerate() {
        if let Some(g) = group {
            expected.entry(format!("g{g}")).or_default().push(index);
        }
    }
    expected
}

proptest! {
    /// Every album is emitted exactly once, with its members in arrival order.
    #[test]
    fn one_batch_per_album_in_arrival_order(
        groups in prop::collection::vec(prop::option::of(0u8..4), 1..40),
        reset in proptest::bool::ANY,
    ) {
        let policy = if reset { TimerPolicy::ResetOnArrival } else { TimerPolicy::ArmOnce };
        let (batches, pending) = run(&groups, policy);

        prop_assert_eq!(pending, 0);

        let singles: Vec<usize> = groups
            .iter()
            .enumerate()
            .filter(|(_, g)| g.is_none())
            .map(|(i, _)| i)
            .collect();
        let emitted_singles: Vec<usize> = batches
            .iter()
            .filter(|b| b.group_id.is_none())
            .flat_map(|b| {
                assert_eq!(b.items.len(), 1);
                b.items.clone()
            })
            .collect();
        prop_assert_eq!(emitted_singles, singles);

        let mut emitted_groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for batch in batches.iter().filter(|b| b.group_id.is_some()) {
            let id = batch.group_id.clone().unwrap_or_default();
            prop_assert!(!emitted_groups.contains_key(&id), "album {} emitted twice", id);
            emitted_groups.insert(id, batch.items.clone());
        }
        prop_assert_eq!(emitted_groups, expected_groups(&groups));
    }
}
