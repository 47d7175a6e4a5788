//! Property-based tests for scan session invariants
//!
//! Random command sequences are replayed against the scripted camera and the
//! camera/notification invariants are checked after every run.
//!
//! Run with: cargo test --test session_props

use crabscan::testing::{MockCamera, RecordingDispatcher, StaticDecoder};
use crabscan::{AcquisitionState, CameraDevice, ConstraintOutcome, ScanConfig, ScanController};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Command {
    Start(u8),
    Select(u8),
    Stop,
    Restart,
    Decode(String),
    Torch(bool),
}

fn command() -> impl Strategy<Value = Command> {
    prop_oneof![
        (0u8..3).prop_map(Command::Start),
        (0u8..3).prop_map(Command::Select),
        Just(Command::Stop),
        Just(Command::Restart),
        "[A-Z0-9]{1,8}".prop_map(Command::Decode),
        any::<bool>().prop_map(Command::Torch),
    ]
}

fn setup() -> (Arc<MockCamera>, Arc<RecordingDispatcher>, ScanController) {
    // Device "2" is not known to the camera, so starting it fails.
    let camera = Arc::new(
        MockCamera::new()
            .with_devices(vec![
                CameraDevice::new("0", "Front"),
                CameraDevice::new("1", ""),
            ])
            .with_torch(),
    );
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let controller = ScanController::builder(
        camera.clone(),
        Arc::new(StaticDecoder::new()),
        dispatcher.clone(),
    )
    .build();
    (camera, dispatcher, controller)
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(2)).await;
}

#[cfg(test)]
mod session_props {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// INVARIANT: Exactly one notification per active period, carrying the first decode
        #[test]
        fn one_notification_per_active_period(
            texts in prop::collection::vec("[A-Z0-9]{1,8}", 1..8),
        ) {
            let (camera, dispatcher, controller) = setup();
            let requests = tokio_test::block_on(async {
                controller.start("0", ScanConfig::default()).await.unwrap();
                for text in &texts {
                    camera.emit_decoded(text);
                }
                dispatcher.wait_for(1, Duration::from_secs(2)).await;
                settle().await;
                dispatcher.requests()
            });

            prop_assert_eq!(requests.len(), 1);
            prop_assert_eq!(&requests[0].payload, &texts[0]);
            prop_assert_eq!(controller.last_result(), Some(texts[0].clone()));
            prop_assert_eq!(controller.state(), AcquisitionState::Idle);
        }

        /// INVARIANT: At most one camera handle is ever open, and stop always ends idle
        #[test]
        fn arbitrary_commands_hold_one_handle(
            commands in prop::collection::vec(command(), 1..16),
        ) {
            let (camera, dispatcher, controller) = setup();
            let mut accepted_periods = 0usize;

            tokio_test::block_on(async {
                for command in &commands {
                    match command {
                        Command::Start(id) => {
                            let _ = controller.start(&id.to_string(), ScanConfig::default()).await;
                        }
                        Command::Select(id) => {
                            let _ = controller.select_device(&id.to_string()).await;
                        }
                        Command::Stop => controller.stop().await,
                        Command::Restart => {
                            let _ = controller.restart().await;
                        }
                        Command::Decode(text) => {
                            if controller.state() == AcquisitionState::Active
                                && camera.emit_decoded(text)
                            {
                                accepted_periods += 1;
                            }
                        }
                        Command::Torch(enabled) => {
                            controller.set_torch(*enabled).await;
                        }
                    }
                    settle().await;
                }
                controller.stop().await;
                dispatcher.wait_for(accepted_periods, Duration::from_secs(2)).await;
                settle().await;
            });

            prop_assert!(camera.max_open_handles() <= 1);
            prop_assert_eq!(camera.open_handles(), 0);
            prop_assert_eq!(controller.state(), AcquisitionState::Idle);
            prop_assert_eq!(dispatcher.count(), accepted_periods);
        }

        /// INVARIANT: stop is idempotent from any reachable state
        #[test]
        fn stop_is_idempotent(
            start_first in any::<bool>(),
            device in 0u8..3,
            repeats in 1usize..5,
        ) {
            let (camera, _dispatcher, controller) = setup();
            tokio_test::block_on(async {
                if start_first {
                    let _ = controller.start(&device.to_string(), ScanConfig::default()).await;
                }
                for _ in 0..repeats {
                    controller.stop().await;
                }
            });

            prop_assert_eq!(controller.state(), AcquisitionState::Idle);
            prop_assert_eq!(camera.open_handles(), 0);
        }

        /// INVARIANT: Torch requests outside an active session never change torch state
        #[test]
        fn torch_outside_active_is_unsupported(
            enabled in any::<bool>(),
            fail_start in any::<bool>(),
        ) {
            let (camera, _dispatcher, controller) = setup();
            let outcome = tokio_test::block_on(async {
                if fail_start {
                    let _ = controller.start("2", ScanConfig::default()).await;
                }
                controller.set_torch(enabled).await
            });

            prop_assert!(matches!(outcome, ConstraintOutcome::Unsupported(_)));
            prop_assert!(!controller.snapshot().torch_enabled);
            prop_assert!(!camera.torch_enabled());
        }
    }
}
