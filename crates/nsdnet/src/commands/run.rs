//! `nsdnet run`: the demonstration loop.
//!
//! Introduce ourselves, list the peers, then poll: when data is pending,
//! drain it and print every received message; otherwise broadcast
//! `Hello World <i>` and sleep for the poll interval.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use nsdnet_core::{Connection, NsdNetProxy, Position2dProxy};

use crate::cli::RunArgs;
use crate::commands::util;
use crate::config::Settings;
use crate::error::CliError;

/// Iterations between random speed commands when driving.
const DRIVE_EVERY: u32 = 10;
/// Upper bound for a random speed, in m/s.
const MAX_SPEED: f64 = 2.0;
/// Random headings fall in `-MAX_TURN_DEG..MAX_TURN_DEG`.
const MAX_TURN_DEG: f64 = 60.0;

pub async fn handle(args: &RunArgs, settings: &Settings) -> Result<(), CliError> {
    let index = args.device.index;
    println!("Using index {index}");

    let (mut conn, messages) = util::open(settings, index).await?;
    let pose = if args.drive {
        match conn.register::<Position2dProxy>(index) {
            Ok(proxy) => Some(proxy),
            Err(e) => {
                conn.close().await;
                return Err(e.into());
            }
        }
    } else {
        None
    };

    let rng = args
        .seed
        .map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);

    let mut driver = Driver {
        conn,
        messages,
        pose,
        rng,
        iterations: args.iterations.unwrap_or(settings.driver.iterations),
        poll_interval: args
            .poll_interval_ms
            .map_or_else(|| settings.poll_interval(), Duration::from_millis),
        wait: args.device.wait(),
    };

    let result = tokio::select! {
        res = driver.run() => res,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, disconnecting");
            Ok(())
        }
    };
    driver.conn.close().await;
    result
}

// ── Driver ───────────────────────────────────────────────────────────

struct Driver {
    conn: Connection,
    messages: NsdNetProxy,
    pose: Option<Position2dProxy>,
    rng: StdRng,
    iterations: u32,
    poll_interval: Duration,
    wait: Duration,
}

impl Driver {
    async fn run(&mut self) -> Result<(), CliError> {
        let id = self.ask_property("self.id").await?;
        println!("Client id: {id}");
        let index = self.ask_property("self.index").await?;
        println!("Client index: {index}");

        self.messages.request_client_list()?;
        let messages = &self.messages;
        let clients = util::await_answer(&mut self.conn, self.wait, "listclients", || {
            messages.client_list_answer()
        })
        .await?;
        println!("Client list:");
        for client in &clients {
            println!("{client}");
        }

        for i in 0..self.iterations {
            self.step(i).await?;
        }

        let dropped = self.messages.dropped_message_count();
        if dropped > 0 {
            info!(dropped, "messages were evicted from a full queue");
        }
        Ok(())
    }

    async fn step(&mut self, i: u32) -> Result<(), CliError> {
        if i % DRIVE_EVERY == 0 {
            self.drive()?;
        }

        if self.conn.peek() {
            self.conn.read().await?;
            while let Some(msg) = self.messages.receive_message() {
                println!("{}: {} [{i}]", msg.source, msg.text());
            }
            tokio::task::yield_now().await;
        } else {
            println!("Sending Hello World");
            self.messages.send_message(format!("Hello World {i}"))?;
            tokio::time::sleep(self.poll_interval).await;
        }
        Ok(())
    }

    /// Set a random speed and heading on the position device, if any.
    fn drive(&mut self) -> Result<(), CliError> {
        let Some(pose) = self.pose.as_ref() else {
            return Ok(());
        };
        if let Some(current) = pose.pose() {
            debug!(x = current.x, y = current.y, yaw = current.yaw, "current pose");
        }
        let speed = self.rng.random_range(0.0..MAX_SPEED);
        let heading = self.rng.random_range(-MAX_TURN_DEG..MAX_TURN_DEG);
        println!("Setting speed: {speed:.3} direction: {heading:.1}");
        pose.set_speed(speed, heading.to_radians())?;
        Ok(())
    }

    async fn ask_property(&mut self, key: &str) -> Result<String, CliError> {
        self.messages.request_property(key)?;
        let value =
            util::wait_for_property(&mut self.conn, &self.messages, key, self.wait).await?;
        Ok(value.value)
    }
}
