use crate::acquire::CycleReport;
use crate::signal::ShutdownFlag;
use crate::types::{Matrix3, SensorFrame};
use crate::{LibertyError, Result};
use crossbeam_channel::{Sender, TrySendError};
use std::io::{self, Write};

/// Consumer of emitted cycles.
pub trait FrameSink {
    fn consume(&mut self, report: &CycleReport) -> Result<()>;
}

/// What the console printer writes for each cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrintMode {
    /// Poses, then matrices, then angles: one block per value group.
    #[default]
    All,
    /// Palm tilt and finger flexion, in degrees.
    Angles,
    /// Decoded position and Euler angles per sensor.
    Poses,
    /// Rotation matrix per sensor.
    Matrices,
    /// Sensor blocks as received.
    Raw,
}

impl PrintMode {
    pub fn parse(s: &str) -> Option<PrintMode> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Some(PrintMode::All),
            "angles" => Some(PrintMode::Angles),
            "poses" => Some(PrintMode::Poses),
            "matrices" => Some(PrintMode::Matrices),
            "raw" => Some(PrintMode::Raw),
            _ => None,
        }
    }
}

/// Writes human-readable readings, flushing after every cycle.
pub struct ConsolePrinter<W: Write> {
    out: W,
    mode: PrintMode,
}

impl ConsolePrinter<io::Stdout> {
    pub fn stdout(mode: PrintMode) -> Self {
        Self::new(io::stdout(), mode)
    }
}

impl<W: Write> ConsolePrinter<W> {
    pub fn new(out: W, mode: PrintMode) -> Self {
        Self { out, mode }
    }

    pub fn mode(&self) -> PrintMode {
        self.mode
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_report(&mut self, report: &CycleReport) -> io::Result<()> {
        match self.mode {
            PrintMode::All => {
                writeln!(self.out, "-- #{} --", report.sequence)?;
                self.write_poses(report)?;
                self.write_matrices(report)?;
                self.write_angles(report)?;
            }
            PrintMode::Angles => self.write_angles(report)?,
            PrintMode::Poses => self.write_poses(report)?,
            PrintMode::Matrices => self.write_matrices(report)?,
            PrintMode::Raw => {
                writeln!(self.out, "[{}] #{}", report.timestamp_us, report.sequence)?;
                for sensor in report.frames.iter() {
                    write_raw(&mut self.out, sensor)?;
                }
            }
        }
        self.out.flush()
    }

    fn write_angles(&mut self, report: &CycleReport) -> io::Result<()> {
        write!(self.out, "tilt: {:6.2}", report.angles.palm_tilt)?;
        for reading in &report.angles.fingers {
            write!(self.out, "  {}: {:6.2}", reading.role.label(), reading.degrees)?;
        }
        writeln!(self.out)
    }

    fn write_poses(&mut self, report: &CycleReport) -> io::Result<()> {
        for sensor in report.frames.iter() {
            write!(self.out, "{}:\t", sensor.role.label())?;
            write_values(&mut self.out, &sensor.pose.as_array())?;
        }
        Ok(())
    }

    fn write_matrices(&mut self, report: &CycleReport) -> io::Result<()> {
        for sensor in report.frames.iter() {
            writeln!(self.out, "{}:", sensor.role.label())?;
            write_matrix(&mut self.out, &sensor.frame.rotation)?;
        }
        Ok(())
    }
}

fn write_values<W: Write>(out: &mut W, values: &[f64]) -> io::Result<()> {
    for v in values {
        write!(out, "{:6.2}  ", v)?;
    }
    writeln!(out)
}

fn write_matrix<W: Write>(out: &mut W, m: &Matrix3) -> io::Result<()> {
    for row in m {
        write!(out, "  ")?;
        write_values(out, row)?;
    }
    Ok(())
}

fn write_raw<W: Write>(out: &mut W, sensor: &SensorFrame) -> io::Result<()> {
    write!(out, "  {}\t", sensor.role.label())?;
    write_values(out, &sensor.raw.to_wire())
}

impl<W: Write> FrameSink for ConsolePrinter<W> {
    fn consume(&mut self, report: &CycleReport) -> Result<()> {
        Ok(self.write_report(report)?)
    }
}

/// Hands reports to another thread without blocking the loop.
pub struct Forwarder {
    tx: Sender<CycleReport>,
}

impl Forwarder {
    pub fn new(tx: Sender<CycleReport>) -> Self {
        Self { tx }
    }
}

impl FrameSink for Forwarder {
    fn consume(&mut self, report: &CycleReport) -> Result<()> {
        match self.tx.try_send(report.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(LibertyError::ChannelFull),
            Err(TrySendError::Disconnected(_)) => Err(LibertyError::ChannelClosed),
        }
    }
}

/// Keeps every report in memory. Can request shutdown after a fixed count.
#[derive(Default)]
pub struct Collector {
    reports: Vec<CycleReport>,
    stop: Option<(usize, ShutdownFlag)>,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop_after(mut self, count: usize, shutdown: ShutdownFlag) -> Self {
        self.stop = Some((count, shutdown));
        self
    }

    pub fn reports(&self) -> &[CycleReport] {
        &self.reports
    }

    pub fn into_reports(self) -> Vec<CycleReport> {
        self.reports
    }
}

impl FrameSink for Collector {
    fn consume(&mut self, report: &CycleReport) -> Result<()> {
        self.reports.push(report.clone());
        if let Some((count, shutdown)) = &self.stop {
            if self.reports.len() >= *count {
                shutdown.request();
            }
        }
        Ok(())
    }
}
