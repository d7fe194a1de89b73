//! Workflow combinators end to end: chain, parallel fan-out, conditional
//! routing, and their event streams.

mod init_logging;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use recording::RecordingObserver;
use skein::{
    Chain, Conditional, Parallel, ParallelConfig, PredicateFn, Routes, WorkflowError,
};

/// **Scenario S6**: three questions through a two-worker pool come back in
/// input order, whatever the scheduling.
#[tokio::test]
async fn parallel_worker_cap_preserves_order() {
    let runner = Parallel::new(ParallelConfig {
        max_workers: 2,
        worker_cap: 8,
        fail_fast: false,
    });
    let items = vec![
        "What is AI?".to_string(),
        "What is ML?".to_string(),
        "What is DL?".to_string(),
    ];

    let token = CancellationToken::new();
    let outcome = runner
        .process(
            &token,
            items,
            |question: String| async move { Ok(format!("ans:{question}")) },
            None,
        )
        .await
        .unwrap();

    assert_eq!(
        outcome.results,
        ["ans:What is AI?", "ans:What is ML?", "ans:What is DL?"]
    );
    assert!(outcome.errors.is_empty());
}

/// **Scenario**: parallel emits start/complete around per-item worker events,
/// with worker events at the Verbose severity.
#[tokio::test]
async fn parallel_emits_documented_events() {
    let observer = RecordingObserver::new();
    let runner = Parallel::new(ParallelConfig {
        max_workers: 2,
        worker_cap: 8,
        fail_fast: false,
    })
    .with_observer(observer.clone());

    let token = CancellationToken::new();
    runner
        .process(&token, vec![1u32, 2, 3], |n| async move { Ok(n) }, None)
        .await
        .unwrap();

    let kinds = observer.kinds();
    assert_eq!(kinds.first().map(String::as_str), Some("parallel.start"));
    assert_eq!(kinds.last().map(String::as_str), Some("parallel.complete"));
    assert_eq!(observer.count("worker.start"), 3);
    assert_eq!(observer.count("worker.complete"), 3);
    assert_eq!(observer.severity_of("worker.start"), Some(5));
    assert_eq!(observer.severity_of("parallel.start"), Some(9));
}

/// **Scenario**: a chain drives state through its steps and emits
/// chain/step events in order.
#[tokio::test]
async fn chain_emits_documented_events() {
    let observer = RecordingObserver::new();
    let chain: Chain<String> = Chain::new("summarize")
        .with_observer(observer.clone())
        .step("draft", |_, s: String| async move { Ok(format!("{s}+draft")) })
        .step("polish", |_, s: String| async move { Ok(format!("{s}+polish")) });

    let token = CancellationToken::new();
    let out = chain.run(&token, "seed".to_string()).await.unwrap();
    assert_eq!(out, "seed+draft+polish");

    assert_eq!(
        observer.kinds(),
        [
            "chain.start",
            "step.start",
            "step.complete",
            "step.start",
            "step.complete",
            "chain.complete",
        ]
    );
}

/// **Scenario**: conditional routing picks the branch, runs it, and emits
/// evaluate/select/execute.
#[tokio::test]
async fn conditional_routes_and_emits_events() {
    let observer = RecordingObserver::new();
    let routes = Routes::new()
        .route("question", |_, s: String| async move { Ok(format!("answering {s}")) })
        .route("command", |_, s: String| async move { Ok(format!("running {s}")) });
    let predicate: PredicateFn<String> = Arc::new(|s: &String| {
        Ok(if s.ends_with('?') { "question" } else { "command" }.to_string())
    });

    let token = CancellationToken::new();
    let out = Conditional::new()
        .with_observer(observer.clone())
        .process(&token, "deploy now".to_string(), predicate, &routes)
        .await
        .unwrap();
    assert_eq!(out, "running deploy now");
    assert_eq!(
        observer.kinds(),
        ["route.evaluate", "route.select", "route.execute"]
    );
}

/// **Scenario**: a chain step that fans out through a parallel pool composes
/// cleanly; the chain aborts when the pool reports total failure.
#[tokio::test]
async fn chain_over_parallel_composes() {
    let pool = Arc::new(Parallel::new(ParallelConfig {
        max_workers: 2,
        worker_cap: 8,
        fail_fast: false,
    }));

    let fan_out = Arc::clone(&pool);
    let chain: Chain<Vec<String>> = Chain::new("research")
        .step("expand", move |token, questions: Vec<String>| {
            let pool = Arc::clone(&fan_out);
            async move {
                let outcome = pool
                    .process(
                        &token,
                        questions,
                        |q: String| async move { Ok(format!("ans:{q}")) },
                        None,
                    )
                    .await
                    .map_err(|e| WorkflowError::failed(e.to_string()))?;
                Ok(outcome.results)
            }
        })
        .step("join", |_, answers: Vec<String>| async move {
            Ok(vec![answers.join("; ")])
        });

    let token = CancellationToken::new();
    let out = chain
        .run(&token, vec!["a?".to_string(), "b?".to_string()])
        .await
        .unwrap();
    assert_eq!(out, ["ans:a?; ans:b?"]);

    let fail_pool = Arc::clone(&pool);
    let failing: Chain<Vec<String>> = Chain::new("research").step("expand", move |token, questions: Vec<String>| {
        let pool = Arc::clone(&fail_pool);
        async move {
            let outcome = pool
                .process(
                    &token,
                    questions,
                    |_q: String| async move {
                        Err::<String, _>(WorkflowError::failed("no sources"))
                    },
                    None,
                )
                .await
                .map_err(|e| WorkflowError::failed(e.to_string()))?;
            Ok(outcome.results)
        }
    });
    let err = failing
        .run(&token, vec!["a?".to_string()])
        .await
        .unwrap_err();
    assert_eq!(err.step, "expand");
}

/// **Scenario**: fail-fast cancellation composes with an outer caller token:
/// cancelling the caller mid-run surfaces a cancelled ParallelError with
/// whatever was collected.
#[tokio::test]
async fn parallel_caller_cancellation_returns_partial() {
    let runner = Parallel::new(ParallelConfig {
        max_workers: 1,
        worker_cap: 8,
        fail_fast: false,
    });
    let token = CancellationToken::new();
    let cancel = token.clone();

    let err = runner
        .process(
            &token,
            vec![0u64, 1, 2, 3],
            move |n| {
                let cancel = cancel.clone();
                async move {
                    if n == 1 {
                        cancel.cancel();
                    }
                    Ok(n)
                }
            },
            None,
        )
        .await
        .unwrap_err();

    assert!(err.cancelled);
    // item 0 and the cancelling item finished; the rest were abandoned
    assert!(err.partial.len() >= 1 && err.partial.len() <= 4);
    assert!(err.errors.is_empty());
}
