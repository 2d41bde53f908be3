// Head Unit Bridge - Map Projection
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Projects a map view onto the head unit.
//!
//! The app owns an offscreen capture surface sized to the car's map
//! area and ships one frame per interval tick.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info};

use super::{CarLink, CarMessage};
use crate::models::{Error, FeatureId, MapsConfig, Result};
use crate::services::{FeatureApp, FeatureWorker, HostContext, WorkerHandle};

const BYTES_PER_PIXEL: usize = 4;

/// Largest surface edge accepted, in pixels.
const MAX_EDGE: u32 = 4096;

/// Offscreen RGBA buffer frames are rendered into.
#[derive(Debug)]
pub struct CaptureSurface {
    width: u32,
    height: u32,
    buffer: Vec<u8>,
}

impl CaptureSurface {
    pub fn allocate(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 || width > MAX_EDGE || height > MAX_EDGE {
            return Err(Error::start_failure(
                FeatureId::Maps,
                format!("invalid capture surface {}x{}", width, height),
            ));
        }
        let len = width as usize * height as usize * BYTES_PER_PIXEL;
        Ok(Self {
            width,
            height,
            buffer: vec![0; len],
        })
    }

    /// Render frame `sequence` and return its size in bytes.
    fn capture(&mut self, sequence: u64) -> usize {
        let shade = (sequence % 256) as u8;
        for pixel in self.buffer.chunks_exact_mut(BYTES_PER_PIXEL) {
            pixel.copy_from_slice(&[shade, shade, shade, 0xff]);
        }
        self.buffer.len()
    }
}

/// Starts the map projection feature.
pub struct MapsWorker {
    config: MapsConfig,
    link: Arc<dyn CarLink>,
}

impl MapsWorker {
    pub fn new(config: MapsConfig, link: Arc<dyn CarLink>) -> Self {
        Self { config, link }
    }
}

impl FeatureWorker for MapsWorker {
    fn start(&self, host: &HostContext) -> Result<WorkerHandle> {
        let app = MapsApp {
            config: self.config,
            link: Arc::clone(&self.link),
            surface: None,
            ticker: None,
            sequence: 0,
        };
        WorkerHandle::spawn(FeatureId::Maps, host, Box::new(app))
    }
}

struct MapsApp {
    config: MapsConfig,
    link: Arc<dyn CarLink>,
    surface: Option<CaptureSurface>,
    ticker: Option<Interval>,
    sequence: u64,
}

#[async_trait]
impl FeatureApp for MapsApp {
    async fn on_create(&mut self) -> Result<()> {
        info!(
            "Starting maps app ({}x{})",
            self.config.width, self.config.height
        );
        self.surface = Some(CaptureSurface::allocate(
            self.config.width,
            self.config.height,
        )?);

        let period = self.config.frame_interval().max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.ticker = Some(ticker);
        Ok(())
    }

    async fn step(&mut self) -> Result<()> {
        let (Some(ticker), Some(surface)) = (self.ticker.as_mut(), self.surface.as_mut()) else {
            return Err(Error::Internal("capture surface not allocated".to_string()));
        };

        ticker.tick().await;
        self.sequence += 1;
        let bytes = surface.capture(self.sequence);
        self.link.send(CarMessage::MapFrame {
            sequence: self.sequence,
            width: surface.width,
            height: surface.height,
            bytes,
        });
        Ok(())
    }

    async fn on_destroy(&mut self) {
        self.ticker = None;
        if let Some(surface) = self.surface.take() {
            debug!("Releasing {} byte capture surface", surface.buffer.len());
        }
        self.link.send(CarMessage::Cleared(FeatureId::Maps));
        info!("Maps app stopped after {} frame(s)", self.sequence);
    }
}
