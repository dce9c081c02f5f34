use std::num::NonZeroUsize;
use std::time::Duration;

use race_core::Engine;
use race_core::Submission;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tower::Service;
use tower::ServiceExt;

use tower_race::RaceError;
use tower_race::managed_submit_service;

#[tokio::main]
async fn main() {
    // 1. Setup Engine: a queue of 32 slots
    let engine = Engine::new(NonZeroUsize::new(32).unwrap());
    let event = engine
        .subscribe_winner()
        .expect("nobody has won a fresh engine");

    // 2. Setup Managed Service: 50ms total wait budget
    // Nothing drains the queue until the loop starts, so late arrivals time out.
    let max_wait = Duration::from_millis(50);
    let managed_service = managed_submit_service(&engine, max_wait);

    println!("🚀 Starting Race...");
    println!("Queue: 32 slots, loop starts after 20ms");
    println!("Managed Budget: 50ms wait\n");

    // 3. Fire 200 answers instantly. Id 0 is invalid and every 25th answer is correct.
    let mut tasks = Vec::new();
    for i in 0..200_i64 {
        let mut svc = managed_service.clone();
        tasks.push(tokio::spawn(async move {
            let submission = Submission::new(i, i % 25 == 24);
            match svc.ready().await {
                Ok(ready_svc) => match ready_svc.call(submission).await {
                    Ok(receipt) => println!("[{i:03}] ✅ {} at {}", receipt.status, receipt.queued_at),
                    Err(e) => {
                        if let Some(race_err) = e.downcast_ref::<RaceError>() {
                            println!("[{i:03}] ❌ Rejected: {race_err}");
                        } else {
                            println!("[{i:03}] 💥 Unexpected Error: {e}");
                        }
                    }
                },
                Err(e) => println!("[{i:03}] ⚠️ Service Unavailable: {e}"),
            }
        }));
    }

    // 4. Start evaluating once the burst has filled the queue
    sleep(Duration::from_millis(20)).await;
    let cancel = CancellationToken::new();
    let evaluator = engine.start(cancel.clone()).expect("started once");

    // Wait for all submissions to finish
    for task in tasks {
        let _ = task.await;
    }
    cancel.cancel();
    let _ = evaluator.await;

    let stats = engine.snapshot();
    match event.recv().await {
        Some(id) => println!("\n🏆 Winner: user {id}"),
        None => println!("\n🤷 No correct answer was evaluated"),
    }
    println!(
        "🏁 Race complete: {} evaluated, {} correct, {} incorrect.",
        stats.total, stats.correct, stats.incorrect
    );
}
