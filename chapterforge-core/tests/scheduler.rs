mod common;

use std::sync::Arc;

use chapterforge_core::contract::{Phase, UnitDescriptor};
use chapterforge_core::progress::RecordingProgress;
use chapterforge_core::schedule::{unit_call_id, UnitOutcome, UnitScheduler};
use chapterforge_core::transform::TransformClient;
use chapterforge_core::PipelineError;
use futures::StreamExt;

use common::{sample_source, ScriptedService};

fn units(count: usize) -> Vec<UnitDescriptor> {
    (1..=count)
        .map(|index| UnitDescriptor {
            index,
            title: format!("Chapter {index}"),
            boundary: None,
        })
        .collect()
}

fn scheduler_for(
    service: Arc<ScriptedService>,
    max_concurrency: usize,
) -> (UnitScheduler, Arc<RecordingProgress>) {
    let progress = Arc::new(RecordingProgress::new());
    let client = TransformClient::new(service, sample_source(), progress.clone());
    (
        UnitScheduler::new(Arc::new(client), max_concurrency),
        progress,
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_workers_never_exceed_the_bound() {
    for (unit_count, bound) in [(1, 1), (3, 5), (5, 5), (8, 2), (12, 3), (4, 1)] {
        let service = Arc::new(ScriptedService::with_chapters(&[]).with_default_delay(20));
        let (scheduler, _) = scheduler_for(service.clone(), bound);

        let results = scheduler
            .schedule_all(&units(unit_count))
            .await
            .expect("all units succeed");

        assert_eq!(results.len(), unit_count);
        let observed = service.max_in_flight();
        assert!(
            observed <= bound.min(unit_count),
            "{unit_count} units with bound {bound}: saw {observed} in flight"
        );
        assert!(observed >= 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn bound_is_reached_when_enough_units_are_pending() {
    let service = Arc::new(ScriptedService::with_chapters(&[]).with_default_delay(100));
    let (scheduler, _) = scheduler_for(service.clone(), 3);

    scheduler.schedule_all(&units(6)).await.unwrap();

    assert_eq!(service.max_in_flight(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn results_are_ordered_by_index_whatever_the_completion_order() {
    // Earlier chapters take longest, so they complete last.
    let service = Arc::new(
        ScriptedService::with_chapters(&[])
            .delayed(1, 120)
            .delayed(2, 80)
            .delayed(3, 40)
            .delayed(4, 0),
    );
    let (scheduler, _) = scheduler_for(service, 4);

    let mut run = scheduler.spawn_all(&units(4)).unwrap();
    let mut completion_order = Vec::new();
    while let Some(outcome) = run.next().await {
        completion_order.push(outcome.index());
    }
    assert_eq!(completion_order, vec![4, 3, 2, 1]);

    let service = Arc::new(
        ScriptedService::with_chapters(&[])
            .delayed(1, 120)
            .delayed(2, 80)
            .delayed(3, 40),
    );
    let (scheduler, _) = scheduler_for(service, 4);
    let results = scheduler.schedule_all(&units(4)).await.unwrap();
    let indices: Vec<_> = results.iter().map(|r| r.index).collect();
    assert_eq!(indices, vec![1, 2, 3, 4]);
    assert_eq!(results[0].body, "<p>chapter 1</p>");
}

#[tokio::test]
async fn empty_unit_list_spawns_no_worker() {
    let service = Arc::new(ScriptedService::with_chapters(&[]));
    let (scheduler, progress) = scheduler_for(service.clone(), 5);

    let err = scheduler.schedule_all(&[]).await.unwrap_err();

    assert!(matches!(err, PipelineError::EmptyRun));
    assert_eq!(service.unit_calls(), 0);
    assert!(progress.events().is_empty());
}

#[tokio::test]
async fn every_unit_is_processed_exactly_once() {
    let service = Arc::new(ScriptedService::with_chapters(&[]));
    let (scheduler, progress) = scheduler_for(service.clone(), 2);

    scheduler.schedule_all(&units(7)).await.unwrap();

    assert_eq!(service.unit_calls(), 7);
    for index in 1..=7 {
        assert_eq!(service.attempts_for(index), 1);
        assert_eq!(
            progress.phases_for(&unit_call_id(index)),
            vec![Phase::Started, Phase::Succeeded]
        );
    }
}

#[tokio::test]
async fn retried_unit_still_produces_a_normal_result() {
    let service = Arc::new(ScriptedService::with_chapters(&[]).failing(2, 2));
    let (scheduler, progress) = scheduler_for(service.clone(), 5);

    let results = scheduler.schedule_all(&units(3)).await.unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results[1].body, "<p>chapter 2</p>");
    assert_eq!(service.attempts_for(2), 3);
    assert_eq!(
        progress.phases_for("chapter-2"),
        vec![Phase::Started, Phase::Retrying, Phase::Retrying, Phase::Succeeded]
    );
}

#[tokio::test]
async fn exhausted_unit_fails_the_whole_schedule() {
    let service = Arc::new(ScriptedService::with_chapters(&[]).failing(1, 3));
    let (scheduler, _) = scheduler_for(service, 5);

    let err = scheduler.schedule_all(&units(2)).await.unwrap_err();

    match err {
        PipelineError::UnitFatal {
            index, attempts, ..
        } => {
            assert_eq!(index, 1);
            assert_eq!(attempts, 3);
        }
        other => panic!("expected UnitFatal, got {other:?}"),
    }
}

#[tokio::test]
async fn failed_unit_is_reported_as_an_outcome() {
    let service = Arc::new(ScriptedService::with_chapters(&[]).failing(2, 10));
    let (scheduler, _) = scheduler_for(service, 5);

    let outcomes: Vec<UnitOutcome> = scheduler.spawn_all(&units(3)).unwrap().collect().await;

    assert_eq!(outcomes.len(), 3);
    let failed: Vec<_> = outcomes
        .iter()
        .filter_map(|o| match o {
            UnitOutcome::Failed(f) => Some(f.index),
            UnitOutcome::Completed(_) => None,
        })
        .collect();
    assert_eq!(failed, vec![2]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelling_a_run_stops_pending_workers() {
    let service = Arc::new(ScriptedService::with_chapters(&[]).with_default_delay(50));
    let (scheduler, _) = scheduler_for(service.clone(), 1);

    let mut run = scheduler.spawn_all(&units(5)).unwrap();
    let first = run.next().await.expect("one unit completes");
    assert!(matches!(first, UnitOutcome::Completed(_)));
    assert_eq!(run.remaining(), 4);
    run.cancel();
    while run.next().await.is_some() {}
    assert_eq!(run.remaining(), 0);
    drop(run);

    assert!(service.unit_calls() < 5, "cancelled workers must not all run");
}
