//! Servo sequencer simulator
//!
//! Builds a simulated vehicle (three servos, action groups, an extended
//! groups provider), authors a pair of demo sequences, and drives the
//! sequencer at a fixed tick rate until interrupted.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use seq_actuator::{
    ExtendedGroups, ServoRegistry, SimActionGroups, SimExtendedGroups, SimServo,
};
use seq_core::{BuiltinGroup, Command, GroupRef, SequenceId, ServoUid};
use seq_engine::{Environment, Runner, Sequencer};
use seq_format::serialize_sequences;
use tokio::sync::Mutex;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// The simulated vehicle: plant models plus the sequencer driving them
struct SimVehicle {
    servos: Vec<Arc<SimServo>>,
    sequencer: Arc<Mutex<Sequencer>>,
}

impl SimVehicle {
    /// Assemble a vehicle with three servos and both group providers
    fn new() -> Self {
        let registry = Arc::new(ServoRegistry::new());
        let mut servos = Vec::new();
        for (uid, name, min, max, rate) in [
            (1u32, "leg-hinge", -90.0, 90.0, 45.0),
            (2u32, "leg-piston", 0.0, 10.0, 4.0),
            (3u32, "antenna-rotor", 0.0, 360.0, 90.0),
        ] {
            let servo = Arc::new(SimServo::new(ServoUid(uid), name, min, max, rate));
            registry.register(servo.clone());
            servos.push(servo);
        }

        let extended_provider = Arc::new(SimExtendedGroups::new());
        extended_provider.assign(1, "Deploy antenna");

        let sequencer = Sequencer::new(
            registry,
            Arc::new(SimActionGroups::new()),
            Arc::new(ExtendedGroups::detect(Some(extended_provider))),
            Environment::Flight,
        );

        Self {
            servos,
            sequencer: Arc::new(Mutex::new(sequencer)),
        }
    }
}

/// Author the demo program: a state-changing deploy sequence plus an
/// auto-started antenna sweep in the deployed state
async fn author_sequences(sequencer: &Mutex<Sequencer>) -> SequenceId {
    let mut sequencer = sequencer.lock().await;
    let deployed = sequencer.add_state("Deployed");

    let deploy = sequencer.create_sequence("Deploy landing legs");
    {
        let sq = sequencer.sequence_mut(deploy).unwrap();
        sq.end_state = deployed;
        sq.commands = vec![
            Command::move_servo(ServoUid(1), 80.0, 1.0),
            Command::move_servo(ServoUid(2), 9.5, 1.0),
            Command::wait_for_moves(),
            Command::toggle_group(GroupRef::Builtin(BuiltinGroup::Lights)),
            Command::delay(1.0),
        ];
    }

    let sweep = sequencer.create_sequence("Antenna sweep");
    {
        let sq = sequencer.sequence_mut(sweep).unwrap();
        sq.start_state = deployed;
        sq.end_state = deployed;
        sq.auto_start = true;
        sq.commands = vec![
            Command::toggle_group(GroupRef::Extended(1)),
            Command::move_servo(ServoUid(3), 350.0, 1.0),
            Command::wait_for_moves(),
            Command::move_servo(ServoUid(3), 10.0, 1.0),
            Command::goto(1, 2),
        ];
    }

    info!(
        document = %serialize_sequences(sequencer.sequences()),
        "Authored sequence document"
    );
    deploy
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting servo sequencer simulator");

    let vehicle = SimVehicle::new();
    let deploy = author_sequences(&vehicle.sequencer).await;

    vehicle
        .sequencer
        .lock()
        .await
        .start_sequence(deploy, Utc::now())?;

    let plant = vehicle.servos.clone();
    let runner = Runner::new(vehicle.sequencer.clone(), Duration::from_millis(50))
        .with_before_tick(move |dt| {
            for servo in &plant {
                servo.advance(dt);
            }
        });
    let heartbeat = tokio::spawn(async move { runner.run().await });

    info!("Simulator running, press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;

    heartbeat.abort();
    info!("Shutting down");
    Ok(())
}
