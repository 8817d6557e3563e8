use std::path::PathBuf;
use std::sync::{Arc, Once};

use futures::future::join_all;
use rust_decimal_macros::dec;
use ulid::Ulid;

use parkade::engine::{Engine, EngineError, ErrorKind, now_ms};
use parkade::model::*;

// ── Test infrastructure ──────────────────────────────────────

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("parkade_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    dir.join(name)
}

fn tomorrow() -> Ms {
    let day = 24 * HOUR_MS;
    (now_ms() / day + 1) * day
}

/// A floor with `n` car slots at 20/h.
async fn garage(name: &str, n: usize) -> (Arc<Engine>, Vec<Slot>) {
    init_tracing();
    let engine = Engine::new(wal_path(name)).unwrap();
    let floor = engine.create_floor(1, "Ground", n as u32).await.unwrap();
    let car = engine
        .create_vehicle_type("CAR", dec!(20), "Standard car bay")
        .await
        .unwrap();
    let mut slots = Vec::with_capacity(n);
    for i in 0..n {
        slots.push(
            engine
                .create_slot(&format!("G-{i:02}"), floor.id, car.id)
                .await
                .unwrap(),
        );
    }
    (Arc::new(engine), slots)
}

fn plate(i: usize) -> String {
    format!("KA{:02}AB{:04}", i % 100, i)
}

// ── Races ────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn many_vehicles_one_slot() {
    let (engine, slots) = garage("one_slot.wal", 1).await;
    let slot_id = slots[0].id;
    let start = tomorrow() + 9 * HOUR_MS;

    let tasks = (0..32).map(|i| {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine
                .create_reservation(ReservationRequest {
                    slot_id,
                    vehicle_number: plate(i),
                    span: Span::new(start + (i as i64 % 3) * 15 * MINUTE_MS, start + 2 * HOUR_MS),
                })
                .await
        })
    });
    let results: Vec<Result<Reservation, EngineError>> =
        join_all(tasks).await.into_iter().map(|r| r.unwrap()).collect();

    let accepted: Vec<&Reservation> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(accepted.len(), 1, "every window overlaps, so only one may win");
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(matches!(err, EngineError::SlotOccupied { .. }), "{err}");
    }
    assert_eq!(engine.list_reservations_for_slot(slot_id).unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn one_vehicle_many_slots() {
    let (engine, slots) = garage("one_vehicle.wal", 16).await;
    let start = tomorrow() + 14 * HOUR_MS;

    let tasks = slots.iter().map(|slot| {
        let engine = engine.clone();
        let slot_id = slot.id;
        tokio::spawn(async move {
            engine
                .create_reservation(ReservationRequest {
                    slot_id,
                    vehicle_number: "MH12CD5678".into(),
                    span: Span::new(start, start + HOUR_MS),
                })
                .await
        })
    });
    let results: Vec<_> = join_all(tasks).await.into_iter().map(|r| r.unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(matches!(err, EngineError::VehicleDoubleBooked { .. }), "{err}");
    }
    assert!(engine.has_vehicle_conflict("MH12CD5678", &Span::new(start, start + HOUR_MS)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn disjoint_requests_all_succeed() {
    let (engine, slots) = garage("disjoint.wal", 8).await;
    let day = tomorrow();

    // Each vehicle gets its own slot; every slot sees four back-to-back hours.
    let tasks = slots.iter().enumerate().flat_map(|(s, slot)| {
        let engine = engine.clone();
        let slot_id = slot.id;
        (0..4).map(move |h| {
            let engine = engine.clone();
            tokio::spawn(async move {
                let start = day + (8 + h) * HOUR_MS;
                engine
                    .create_reservation(ReservationRequest {
                        slot_id,
                        vehicle_number: plate(s * 10 + h as usize),
                        span: Span::new(start, start + HOUR_MS),
                    })
                    .await
            })
        })
    });
    let results: Vec<_> = join_all(tasks.collect::<Vec<_>>())
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(engine.list_active_reservations().len(), 32);

    let q = AvailabilityQuery {
        span: Span::new(day + 8 * HOUR_MS, day + 12 * HOUR_MS),
        vehicle_type_id: None,
    };
    assert!(engine.find_available(&q).unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn create_racing_slot_delete_leaves_no_orphans() {
    let (engine, slots) = garage("delete_race.wal", 1).await;
    let slot_id = slots[0].id;
    let start = tomorrow() + 10 * HOUR_MS;

    let creates = (0..16).map(|i| {
        let engine = engine.clone();
        tokio::spawn(async move {
            let s = start + i as i64 * HOUR_MS;
            engine
                .create_reservation(ReservationRequest {
                    slot_id,
                    vehicle_number: plate(i),
                    span: Span::new(s, s + HOUR_MS),
                })
                .await
        })
    });
    let handles: Vec<_> = creates.collect();
    engine.delete_slot(slot_id).await.unwrap();

    for result in join_all(handles).await {
        if let Err(e) = result.unwrap() {
            assert_eq!(e.kind(), ErrorKind::NotFound, "{e}");
        }
    }
    // Anything created before the delete was cascaded; nothing after it got in.
    assert!(engine.list_reservations().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn state_survives_restart_after_concurrent_load() {
    init_tracing();
    let path = wal_path("restart.wal");
    let day = tomorrow();
    let expected;
    {
        let engine = Arc::new(Engine::new(path.clone()).unwrap());
        let floor = engine.create_floor(2, "First", 4).await.unwrap();
        let car = engine.create_vehicle_type("CAR", dec!(20), "").await.unwrap();
        let mut slot_ids = Vec::new();
        for i in 0..4 {
            slot_ids.push(engine.create_slot(&format!("F-{i}"), floor.id, car.id).await.unwrap().id);
        }

        let tasks = slot_ids.iter().enumerate().map(|(i, &slot_id)| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .create_reservation(ReservationRequest {
                        slot_id,
                        vehicle_number: plate(i),
                        span: Span::new(day + 10 * HOUR_MS, day + 13 * HOUR_MS),
                    })
                    .await
                    .unwrap()
            })
        });
        let created: Vec<Reservation> = join_all(tasks).await.into_iter().map(|r| r.unwrap()).collect();
        engine.cancel_reservation(created[0].id).await.unwrap();
        expected = engine.list_reservations();
    }

    let engine = Engine::new(path).unwrap();
    assert_eq!(engine.list_reservations(), expected);
    assert_eq!(engine.list_active_reservations().len(), 3);
    assert!(expected.iter().all(|r| r.total_cost == dec!(60)));
}
