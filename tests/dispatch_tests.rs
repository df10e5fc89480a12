//! Tests del motor de dispatch y del protocolo de confirmación.
//!
//! Corren el controlador real sobre los stores en memoria, con un wallet
//! mock que registra cada movimiento. Cubren las propiedades del ciclo de
//! vida: un solo ganador por carrera de claim, sin estados salteados,
//! settlement atómico y escalamiento por timeout.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use boride_backend::clients::wallet::WalletGateway;
use boride_backend::controllers::ride_controller::RideController;
use boride_backend::dto::ride_dto::{
    AcceptRideRequest, BookRideRequest, CancelRideRequest, CompleteRideRequest, ConfirmAction,
    ConfirmCompletionRequest, RateRideRequest,
};
use boride_backend::models::ride::{
    Location, PaymentMethod, Ride, RideStatus, TimelineEventType,
};
use boride_backend::models::user::UserRole;
use boride_backend::repositories::availability_repository::AvailabilityRegistry;
use boride_backend::repositories::memory::{MemoryAvailabilityRegistry, MemoryRideStore};
use boride_backend::repositories::ride_repository::{RideStore, TransitionUpdate};
use boride_backend::services::escalation_service::EscalationService;
use boride_backend::utils::errors::{AppError, AppResult};

/// Wallet de prueba: saldos en memoria y registro de movimientos.
/// Igual que el gateway real, deduplica por referencia: un reintento con
/// una referencia ya aplicada responde Ok sin mover saldo.
#[derive(Default)]
struct MockWallet {
    balances: Mutex<HashMap<Uuid, Decimal>>,
    movements: Mutex<Vec<(String, Uuid, Decimal)>>,
}

impl MockWallet {
    fn set_balance(&self, user_id: Uuid, balance: Decimal) {
        self.balances.lock().unwrap().insert(user_id, balance);
    }

    fn movements(&self) -> Vec<(String, Uuid, Decimal)> {
        self.movements.lock().unwrap().clone()
    }
}

#[async_trait]
impl WalletGateway for MockWallet {
    async fn get_balance(&self, user_id: Uuid) -> AppResult<Decimal> {
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(&user_id)
            .copied()
            .unwrap_or(Decimal::ZERO))
    }

    async fn debit(&self, user_id: Uuid, amount: Decimal, reference: &str) -> AppResult<()> {
        let mut balances = self.balances.lock().unwrap();
        let mut movements = self.movements.lock().unwrap();
        if movements.iter().any(|(r, _, _)| r == reference) {
            return Ok(());
        }
        let balance = balances.get(&user_id).copied().unwrap_or(Decimal::ZERO);
        if balance < amount {
            return Err(AppError::Settlement(
                "Insufficient wallet balance".to_string(),
            ));
        }
        balances.insert(user_id, balance - amount);
        movements.push((reference.to_string(), user_id, amount));
        Ok(())
    }

    async fn credit(&self, user_id: Uuid, amount: Decimal, reference: &str) -> AppResult<()> {
        let mut balances = self.balances.lock().unwrap();
        let mut movements = self.movements.lock().unwrap();
        if movements.iter().any(|(r, _, _)| r == reference) {
            return Ok(());
        }
        let balance = balances.get(&user_id).copied().unwrap_or(Decimal::ZERO);
        balances.insert(user_id, balance + amount);
        movements.push((reference.to_string(), user_id, amount));
        Ok(())
    }
}

type TestController = RideController<MemoryRideStore, MemoryAvailabilityRegistry, Arc<MockWallet>>;

struct TestApp {
    controller: Arc<TestController>,
    store: MemoryRideStore,
    availability: MemoryAvailabilityRegistry,
    wallet: Arc<MockWallet>,
}

fn test_app() -> TestApp {
    let store = MemoryRideStore::new();
    let availability = MemoryAvailabilityRegistry::new();
    let wallet = Arc::new(MockWallet::default());
    let controller = Arc::new(RideController::new(
        store.clone(),
        availability.clone(),
        wallet.clone(),
    ));
    TestApp {
        controller,
        store,
        availability,
        wallet,
    }
}

fn location(address: &str) -> Location {
    Location {
        address: address.to_string(),
        coords: None,
    }
}

fn book_request(fare: i64, payment_method: PaymentMethod) -> BookRideRequest {
    BookRideRequest {
        pickup_location: location("Main Gate"),
        dropoff_location: location("Faculty of Engineering"),
        fare: Decimal::from(fare),
        payment_method,
        estimated_distance: Some(Decimal::new(32, 1)), // 3.2 km
        estimated_duration: Some(15),
    }
}

async fn online_driver(app: &TestApp) -> Uuid {
    let driver_id = Uuid::new_v4();
    app.availability.set_online(driver_id, true).await.unwrap();
    driver_id
}

/// Llevar un viaje recién creado hasta `completion_requested`
async fn drive_to_completion_requested(app: &TestApp, ride: &Ride, driver_id: Uuid) -> Ride {
    app.controller
        .accept_ride(ride.id, driver_id, AcceptRideRequest { estimated_arrival: 5 })
        .await
        .unwrap();
    app.controller.start_ride(ride.id, driver_id).await.unwrap();
    app.controller
        .request_completion(
            ride.id,
            driver_id,
            CompleteRideRequest {
                actual_distance: Decimal::from(3),
                actual_duration: 20,
            },
        )
        .await
        .unwrap()
}

fn timeline_types(ride: &Ride) -> Vec<TimelineEventType> {
    ride.timeline.0.iter().map(|e| e.event_type).collect()
}

#[tokio::test]
async fn happy_path_cash_ride_with_rating() {
    let app = test_app();
    let student_id = Uuid::new_v4();
    let driver_id = online_driver(&app).await;

    let ride = app
        .controller
        .book_ride(student_id, book_request(1500, PaymentMethod::Cash))
        .await
        .unwrap();
    assert_eq!(ride.status, RideStatus::Pending);

    let ride = drive_to_completion_requested(&app, &ride, driver_id).await;
    assert_eq!(ride.status, RideStatus::CompletionRequested);
    assert!(ride.completion_requested_at.is_some());
    assert_eq!(ride.actual_distance, Some(Decimal::from(3)));
    assert_eq!(ride.actual_duration, Some(20));

    let confirmed = app
        .controller
        .confirm_completion(
            ride.id,
            student_id,
            ConfirmCompletionRequest {
                action: ConfirmAction::Confirm,
                reason: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(confirmed.status, RideStatus::Completed);
    assert!(confirmed.completion_requested_at.is_none());
    assert!(confirmed.completed_at.is_some());

    // Pago en efectivo: ninguna llamada al gateway
    assert!(app.wallet.movements().is_empty());

    let rated = app
        .controller
        .rate_ride(
            confirmed.id,
            student_id,
            RateRideRequest {
                rating: 5,
                review: Some("Smooth ride".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(rated.rating, Some(5));

    // Segunda calificación rechazada
    let err = app
        .controller
        .rate_ride(
            confirmed.id,
            student_id,
            RateRideRequest {
                rating: 4,
                review: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::State(_)));
}

#[tokio::test]
async fn timeline_records_every_transition_in_order() {
    let app = test_app();
    let student_id = Uuid::new_v4();
    let driver_id = online_driver(&app).await;

    let ride = app
        .controller
        .book_ride(student_id, book_request(800, PaymentMethod::Cash))
        .await
        .unwrap();
    let ride = drive_to_completion_requested(&app, &ride, driver_id).await;
    let ride = app
        .controller
        .confirm_completion(
            ride.id,
            student_id,
            ConfirmCompletionRequest {
                action: ConfirmAction::Confirm,
                reason: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(
        timeline_types(&ride),
        vec![
            TimelineEventType::Requested,
            TimelineEventType::Accepted,
            TimelineEventType::Started,
            TimelineEventType::CompletionRequested,
            TimelineEventType::Completed,
        ]
    );

    // Timestamps no decrecientes y último evento coherente con el status
    let timestamps: Vec<_> = ride.timeline.0.iter().map(|e| e.timestamp).collect();
    assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(
        ride.timeline.0.last().unwrap().event_type,
        TimelineEventType::Completed
    );
    assert_eq!(ride.status, RideStatus::Completed);
}

#[tokio::test]
async fn claim_race_has_exactly_one_winner() {
    let app = test_app();
    let student_id = Uuid::new_v4();

    let ride = app
        .controller
        .book_ride(student_id, book_request(1500, PaymentMethod::Cash))
        .await
        .unwrap();

    let mut drivers = Vec::new();
    for _ in 0..8 {
        drivers.push(online_driver(&app).await);
    }

    let handles: Vec<_> = drivers
        .iter()
        .map(|&driver_id| {
            let controller = app.controller.clone();
            let ride_id = ride.id;
            tokio::spawn(async move {
                controller
                    .accept_ride(ride_id, driver_id, AcceptRideRequest { estimated_arrival: 5 })
                    .await
            })
        })
        .collect();

    let results: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let winners: Vec<_> = results.iter().filter(|r| r.is_ok()).collect();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(AppError::Conflict(_))))
        .count();

    assert_eq!(winners.len(), 1);
    assert_eq!(conflicts, 7);

    let ride = app.store.get(ride.id).await.unwrap();
    assert_eq!(ride.status, RideStatus::Accepted);
    assert!(ride.driver_id.is_some());

    // Para los perdedores el viaje desaparece del feed en el próximo poll
    for &driver_id in &drivers {
        if Some(driver_id) != ride.driver_id {
            let available = app.controller.available_rides(driver_id).await.unwrap();
            assert!(available.iter().all(|r| r.id != ride.id));
        }
    }
}

#[tokio::test]
async fn wallet_confirmation_fails_without_balance_and_leaves_state() {
    let app = test_app();
    let student_id = Uuid::new_v4();
    let driver_id = online_driver(&app).await;
    app.wallet.set_balance(student_id, Decimal::from(1000));

    let ride = app
        .controller
        .book_ride(student_id, book_request(1500, PaymentMethod::Wallet))
        .await
        .unwrap();
    let ride = drive_to_completion_requested(&app, &ride, driver_id).await;

    let err = app
        .controller
        .confirm_completion(
            ride.id,
            student_id,
            ConfirmCompletionRequest {
                action: ConfirmAction::Confirm,
                reason: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Settlement(_)));

    // Sin cambios de estado ni movimientos parciales
    let ride = app.store.get(ride.id).await.unwrap();
    assert_eq!(ride.status, RideStatus::CompletionRequested);
    assert!(app.wallet.movements().is_empty());

    // Con saldo suficiente la confirmación liquida débito y payout
    app.wallet.set_balance(student_id, Decimal::from(2000));
    let confirmed = app
        .controller
        .confirm_completion(
            ride.id,
            student_id,
            ConfirmCompletionRequest {
                action: ConfirmAction::Confirm,
                reason: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(confirmed.status, RideStatus::Completed);

    let movements = app.wallet.movements();
    assert_eq!(movements.len(), 2);
    assert_eq!(movements[0].0, format!("ride:{}:fare", ride.id));
    assert_eq!(movements[0].1, student_id);
    assert_eq!(movements[1].0, format!("ride:{}:payout", ride.id));
    assert_eq!(movements[1].1, driver_id);
    assert_eq!(
        app.wallet.get_balance(student_id).await.unwrap(),
        Decimal::from(500)
    );
}

#[tokio::test]
async fn duplicate_confirmations_never_refund_a_settled_fare() {
    let app = test_app();
    let student_id = Uuid::new_v4();
    let driver_id = online_driver(&app).await;
    app.wallet.set_balance(student_id, Decimal::from(5000));

    let ride = app
        .controller
        .book_ride(student_id, book_request(1500, PaymentMethod::Wallet))
        .await
        .unwrap();
    let ride = drive_to_completion_requested(&app, &ride, driver_id).await;

    // Doble click / reintento del cliente: confirms concurrentes
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let controller = app.controller.clone();
            let ride_id = ride.id;
            tokio::spawn(async move {
                controller
                    .confirm_completion(
                        ride_id,
                        student_id,
                        ConfirmCompletionRequest {
                            action: ConfirmAction::Confirm,
                            reason: None,
                        },
                    )
                    .await
            })
        })
        .collect();

    let results: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    // El ganador completa; un duplicado recibe el viaje completado como
    // respuesta idempotente o un error de estado, nunca otra cosa
    assert!(results.iter().any(|r| r.is_ok()));
    for result in &results {
        match result {
            Ok(ride) => assert_eq!(ride.status, RideStatus::Completed),
            Err(err) => assert!(matches!(err, AppError::State(_))),
        }
    }

    // El débito legítimo queda en pie: débito + payout, sin reembolso
    let movements = app.wallet.movements();
    assert_eq!(movements.len(), 2);
    assert!(movements.iter().all(|(r, _, _)| !r.ends_with(":refund")));
    assert_eq!(
        app.wallet.get_balance(student_id).await.unwrap(),
        Decimal::from(3500)
    );
    assert_eq!(
        app.wallet.get_balance(driver_id).await.unwrap(),
        Decimal::from(1500)
    );
    assert_eq!(
        app.store.get(ride.id).await.unwrap().status,
        RideStatus::Completed
    );
}

#[tokio::test]
async fn store_rejects_a_second_active_ride_per_driver() {
    let app = test_app();
    let student_id = Uuid::new_v4();
    let driver_id = online_driver(&app).await;

    let first = app
        .controller
        .book_ride(student_id, book_request(800, PaymentMethod::Cash))
        .await
        .unwrap();
    app.controller
        .accept_ride(first.id, driver_id, AcceptRideRequest { estimated_arrival: 3 })
        .await
        .unwrap();

    let second = app
        .controller
        .book_ride(student_id, book_request(800, PaymentMethod::Cash))
        .await
        .unwrap();

    // Un accept que esquivó la verificación previa choca igual en el store
    let update = TransitionUpdate::new(
        RideStatus::Accepted,
        TimelineEventType::Accepted,
        Some("Driver accepted the ride".to_string()),
    )
    .with_driver(driver_id)
    .with_estimated_arrival(5);

    let err = app
        .store
        .compare_and_transition(second.id, RideStatus::Pending, update)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(
        app.store.get(second.id).await.unwrap().status,
        RideStatus::Pending
    );
}

#[tokio::test]
async fn no_state_can_be_skipped() {
    let app = test_app();
    let student_id = Uuid::new_v4();
    let driver_id = online_driver(&app).await;

    let ride = app
        .controller
        .book_ride(student_id, book_request(900, PaymentMethod::Cash))
        .await
        .unwrap();

    // Iniciar sin claim previo: no hay conductor asignado
    let err = app.controller.start_ride(ride.id, driver_id).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    // Completar desde `accepted` (sin pasar por `ongoing`)
    app.controller
        .accept_ride(ride.id, driver_id, AcceptRideRequest { estimated_arrival: 3 })
        .await
        .unwrap();
    let err = app
        .controller
        .request_completion(
            ride.id,
            driver_id,
            CompleteRideRequest {
                actual_distance: Decimal::ONE,
                actual_duration: 5,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::State(_)));

    // Confirmar desde `ongoing` (sin solicitud de completado)
    app.controller.start_ride(ride.id, driver_id).await.unwrap();
    let err = app
        .controller
        .confirm_completion(
            ride.id,
            student_id,
            ConfirmCompletionRequest {
                action: ConfirmAction::Confirm,
                reason: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::State(_)));
}

#[tokio::test]
async fn dispute_requires_reason_and_skips_settlement() {
    let app = test_app();
    let student_id = Uuid::new_v4();
    let driver_id = online_driver(&app).await;
    app.wallet.set_balance(student_id, Decimal::from(5000));

    let ride = app
        .controller
        .book_ride(student_id, book_request(1200, PaymentMethod::Wallet))
        .await
        .unwrap();
    let ride = drive_to_completion_requested(&app, &ride, driver_id).await;

    let err = app
        .controller
        .confirm_completion(
            ride.id,
            student_id,
            ConfirmCompletionRequest {
                action: ConfirmAction::Reject,
                reason: Some("   ".to_string()),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let disputed = app
        .controller
        .confirm_completion(
            ride.id,
            student_id,
            ConfirmCompletionRequest {
                action: ConfirmAction::Reject,
                reason: Some("Wrong destination".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(disputed.status, RideStatus::Disputed);
    assert_eq!(disputed.dispute_reason.as_deref(), Some("Wrong destination"));
    assert!(app.wallet.movements().is_empty());
}

#[tokio::test]
async fn cancellation_rules() {
    let app = test_app();
    let student_id = Uuid::new_v4();
    let driver_id = online_driver(&app).await;

    // Estudiante cancela un pending sin razón
    let ride = app
        .controller
        .book_ride(student_id, book_request(700, PaymentMethod::Cash))
        .await
        .unwrap();
    let cancelled = app
        .controller
        .cancel_ride(
            ride.id,
            student_id,
            UserRole::Student,
            CancelRideRequest { reason: None },
        )
        .await
        .unwrap();
    assert_eq!(cancelled.status, RideStatus::Cancelled);

    // Conductor necesita razón para cancelar un accepted
    let ride = app
        .controller
        .book_ride(student_id, book_request(700, PaymentMethod::Cash))
        .await
        .unwrap();
    app.controller
        .accept_ride(ride.id, driver_id, AcceptRideRequest { estimated_arrival: 4 })
        .await
        .unwrap();

    let err = app
        .controller
        .cancel_ride(
            ride.id,
            driver_id,
            UserRole::Driver,
            CancelRideRequest { reason: None },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    // Un tercero no puede cancelar
    let err = app
        .controller
        .cancel_ride(
            ride.id,
            Uuid::new_v4(),
            UserRole::Student,
            CancelRideRequest { reason: None },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let cancelled = app
        .controller
        .cancel_ride(
            ride.id,
            driver_id,
            UserRole::Driver,
            CancelRideRequest {
                reason: Some("Vehicle breakdown".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(cancelled.status, RideStatus::Cancelled);
    assert_eq!(cancelled.cancel_reason.as_deref(), Some("Vehicle breakdown"));

    // Desde `ongoing` ya no se cancela
    let ride = app
        .controller
        .book_ride(student_id, book_request(700, PaymentMethod::Cash))
        .await
        .unwrap();
    app.controller
        .accept_ride(ride.id, driver_id, AcceptRideRequest { estimated_arrival: 4 })
        .await
        .unwrap();
    app.controller.start_ride(ride.id, driver_id).await.unwrap();
    let err = app
        .controller
        .cancel_ride(
            ride.id,
            student_id,
            UserRole::Student,
            CancelRideRequest { reason: None },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::State(_)));
}

#[tokio::test]
async fn cancel_and_start_race_has_one_winner() {
    let app = test_app();
    let student_id = Uuid::new_v4();
    let driver_id = online_driver(&app).await;

    let ride = app
        .controller
        .book_ride(student_id, book_request(600, PaymentMethod::Cash))
        .await
        .unwrap();
    app.controller
        .accept_ride(ride.id, driver_id, AcceptRideRequest { estimated_arrival: 2 })
        .await
        .unwrap();

    let cancel_handle = {
        let controller = app.controller.clone();
        let ride_id = ride.id;
        tokio::spawn(async move {
            controller
                .cancel_ride(
                    ride_id,
                    student_id,
                    UserRole::Student,
                    CancelRideRequest { reason: None },
                )
                .await
                .map(|r| r.status)
        })
    };
    let start_handle = {
        let controller = app.controller.clone();
        let ride_id = ride.id;
        tokio::spawn(async move {
            controller
                .start_ride(ride_id, driver_id)
                .await
                .map(|r| r.status)
        })
    };

    let results = vec![
        cancel_handle.await.unwrap(),
        start_handle.await.unwrap(),
    ];
    let ok_count = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(ok_count, 1);

    let final_status = app.store.get(ride.id).await.unwrap().status;
    assert!(matches!(
        final_status,
        RideStatus::Cancelled | RideStatus::Ongoing
    ));
}

#[tokio::test]
async fn availability_gates_dispatch_visibility() {
    let app = test_app();
    let student_id = Uuid::new_v4();
    let driver_id = Uuid::new_v4();

    app.controller
        .book_ride(student_id, book_request(1000, PaymentMethod::Cash))
        .await
        .unwrap();

    // Nunca se puso en línea: feed vacío y claim rechazado
    assert!(app.controller.available_rides(driver_id).await.unwrap().is_empty());

    app.availability.set_online(driver_id, true).await.unwrap();
    assert_eq!(
        app.availability.list_online_drivers().await.unwrap(),
        vec![driver_id]
    );
    let available = app.controller.available_rides(driver_id).await.unwrap();
    assert_eq!(available.len(), 1);

    // Con un viaje activo el feed vuelve a estar vacío
    app.controller
        .accept_ride(available[0].id, driver_id, AcceptRideRequest { estimated_arrival: 5 })
        .await
        .unwrap();
    app.controller
        .book_ride(student_id, book_request(1100, PaymentMethod::Cash))
        .await
        .unwrap();
    assert!(app.controller.available_rides(driver_id).await.unwrap().is_empty());

    // Apagarse no cancela el viaje activo, solo lo saca del registro en línea
    app.availability.set_online(driver_id, false).await.unwrap();
    assert!(app
        .availability
        .list_online_drivers()
        .await
        .unwrap()
        .is_empty());
    let active = app.store.find_active_by_driver(driver_id).await.unwrap();
    assert!(active.is_some());
}

#[tokio::test]
async fn offline_driver_cannot_claim() {
    let app = test_app();
    let student_id = Uuid::new_v4();
    let driver_id = Uuid::new_v4();

    let ride = app
        .controller
        .book_ride(student_id, book_request(1000, PaymentMethod::Cash))
        .await
        .unwrap();

    let err = app
        .controller
        .accept_ride(ride.id, driver_id, AcceptRideRequest { estimated_arrival: 5 })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::State(_)));

    // Y con un viaje activo tampoco puede reclamar otro
    app.availability.set_online(driver_id, true).await.unwrap();
    app.controller
        .accept_ride(ride.id, driver_id, AcceptRideRequest { estimated_arrival: 5 })
        .await
        .unwrap();
    let second = app
        .controller
        .book_ride(student_id, book_request(1000, PaymentMethod::Cash))
        .await
        .unwrap();
    let err = app
        .controller
        .accept_ride(second.id, driver_id, AcceptRideRequest { estimated_arrival: 5 })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn pending_confirmation_poll_lifecycle() {
    let app = test_app();
    let student_id = Uuid::new_v4();
    let driver_id = online_driver(&app).await;

    assert!(app
        .controller
        .pending_confirmation(student_id)
        .await
        .unwrap()
        .is_none());

    let ride = app
        .controller
        .book_ride(student_id, book_request(1300, PaymentMethod::Cash))
        .await
        .unwrap();
    let ride = drive_to_completion_requested(&app, &ride, driver_id).await;

    let pending = app
        .controller
        .pending_confirmation(student_id)
        .await
        .unwrap()
        .expect("should have a pending confirmation");
    assert_eq!(pending.id, ride.id);

    app.controller
        .confirm_completion(
            ride.id,
            student_id,
            ConfirmCompletionRequest {
                action: ConfirmAction::Confirm,
                reason: None,
            },
        )
        .await
        .unwrap();

    assert!(app
        .controller
        .pending_confirmation(student_id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn stale_confirmations_are_escalated() {
    let app = test_app();
    let student_id = Uuid::new_v4();
    let driver_id = online_driver(&app).await;

    let ride = app
        .controller
        .book_ride(student_id, book_request(1400, PaymentMethod::Cash))
        .await
        .unwrap();
    let ride = drive_to_completion_requested(&app, &ride, driver_id).await;

    app.store
        .backdate_completion_request(ride.id, Utc::now() - Duration::hours(25))
        .await;

    let escalation = EscalationService::new(app.store.clone());
    let cutoff = Utc::now() - Duration::hours(24);

    let escalated = escalation.run_sweep(cutoff).await.unwrap();
    assert_eq!(escalated, 1);

    let ride = app.store.get(ride.id).await.unwrap();
    assert_eq!(ride.status, RideStatus::Disputed);
    assert_eq!(
        ride.timeline.0.last().unwrap().event_type,
        TimelineEventType::Escalated
    );

    // El segundo barrido no encuentra nada
    assert_eq!(escalation.run_sweep(cutoff).await.unwrap(), 0);
}

#[tokio::test]
async fn booking_validation() {
    let app = test_app();
    let student_id = Uuid::new_v4();

    let mut request = book_request(0, PaymentMethod::Cash);
    let err = app.controller.book_ride(student_id, request).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    request = book_request(500, PaymentMethod::Cash);
    request.pickup_location.address = "   ".to_string();
    let err = app.controller.book_ride(student_id, request).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn only_the_ride_student_can_confirm_or_rate() {
    let app = test_app();
    let student_id = Uuid::new_v4();
    let other_student = Uuid::new_v4();
    let driver_id = online_driver(&app).await;

    let ride = app
        .controller
        .book_ride(student_id, book_request(1000, PaymentMethod::Cash))
        .await
        .unwrap();
    let ride = drive_to_completion_requested(&app, &ride, driver_id).await;

    let err = app
        .controller
        .confirm_completion(
            ride.id,
            other_student,
            ConfirmCompletionRequest {
                action: ConfirmAction::Confirm,
                reason: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    app.controller
        .confirm_completion(
            ride.id,
            student_id,
            ConfirmCompletionRequest {
                action: ConfirmAction::Confirm,
                reason: None,
            },
        )
        .await
        .unwrap();

    let err = app
        .controller
        .rate_ride(
            ride.id,
            other_student,
            RateRideRequest {
                rating: 1,
                review: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}
