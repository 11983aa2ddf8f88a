use anyhow::Result;
use clap::Parser;
use mantis_cli::logging;
use mantis_controller::{
    arm_config::{ArmConfig, GripperConfig},
    arm_controller::{CobotArm, JointPositions, Pose},
    connection::ConnectionManager,
    device_link::SerialLinkFactory,
    gripper::CobotGripper,
    spatial::{EulerAngles, OrientationValue},
};
use nalgebra as na;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{sync::Mutex, time::sleep};

#[derive(Parser)]
#[command(author, version)]
struct Args {
    /// Serial port to use, defaults to the packaged configuration
    #[arg()]
    port: Option<String>,

    /// Baud rate for the serial port
    #[arg(short, long)]
    baud: Option<u32>,

    /// Sets the level of verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::setup_tracing(args.verbose);

    let mut config = ArmConfig::included();
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(baud) = args.baud {
        config.baud = baud;
    }
    config.validate()?;

    let manager = ConnectionManager::new(SerialLinkFactory::new(&config.port, config.baud));
    let arm = CobotArm::connect(config, &manager).await?;
    let arm = Arc::new(Mutex::new(arm));
    let gripper = CobotGripper::new(arm.clone(), GripperConfig::default())?;

    tracing::info!("Connected, {} owners", manager.owner_count().await);

    let keep_running = Arc::new(AtomicBool::new(true));

    tokio::spawn({
        let keep_running = keep_running.clone();
        async move {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to wait for Ctrl+c");
            tracing::info!("Detected Ctrl+c");
            keep_running.store(false, Ordering::Relaxed);
        }
    });

    while keep_running.load(Ordering::Relaxed) {
        arm.lock()
            .await
            .move_to_joint_positions(&JointPositions::new([0.0; 6]))
            .await?;
        gripper.open().await?;

        if !keep_running.load(Ordering::Relaxed) {
            continue;
        }

        sleep(Duration::from_secs(4)).await;

        let pose = arm.lock().await.end_position().await?;
        tracing::info!(?pose, "current pose");

        arm.lock()
            .await
            .move_to_position(&Pose::new(
                na::Vector3::new(160.0, -20.0, 180.0),
                OrientationValue::Euler(EulerAngles::from_degrees(0.0, 90.0, 0.0)),
            ))
            .await?;
        gripper.grab().await?;

        if !keep_running.load(Ordering::Relaxed) {
            continue;
        }

        sleep(Duration::from_secs(4)).await;
    }

    tracing::info!("Stopping and disconnecting");
    let mut arm = arm.lock().await;
    arm.stop().await?;
    arm.close().await?;

    Ok(())
}
