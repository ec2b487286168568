//! Post-processing CLI (section 6 / 10.D): reads RINEX OBS/NAV (and
//! optionally SP3/IONEX/SBAS) files, runs the driver, and writes a solution
//! file in one of {LLH, XYZ, ENU, NMEA, status}.
//!
//! Flag naming follows `rinex-cli`'s `clap`-driven `Cli` (short flags,
//! one-line `help`), rebuilt with `clap::Parser` derive per SPEC_FULL
//! section 10.D rather than the teacher's `Command`/`Arg` builder, since
//! this binary's flag set is fixed rather than generated per subcommand.

use clap::Parser;
use gnss_rs::prelude::Constellation;
use rtk_core::config::{BaselineConstraint, Config, OutputFormat, PositioningMode, ProcessingDirection};
use rtk_core::driver::{self, EpochInput, EpochSource, TrackingUpdate};
use rtk_core::error::{Error, Result};
use rtk_core::evaluator::{self, EphemerisSource};
use rtk_core::observable::{Lli, ObservableKind};
use rtk_core::parsing;
use rtk_core::rtk::ambiguity::BiasCandidate;
use rtk_core::rtk::filter::{sd_variance_m2, SdMeasurement, SdVarianceInputs, SlipInput};
use rtk_core::sat::SatIndex;
use rtk_core::solution::{format_solution, geodetic_to_ecef};
use rtk_core::store::observation::Receiver;
use rtk_core::store::Context;
use rtk_core::time::Instant;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::process::ExitCode;
use std::str::FromStr;

/// Post-processing RTK driver, section 6's external CLI interface.
#[derive(Parser, Debug)]
#[command(name = "rtkpost", version, about = "RTK post-processing driver")]
struct Args {
    /// Input RINEX/SP3/IONEX/SBAS files (OBS required, NAV required, others optional)
    #[arg(required = true)]
    files: Vec<String>,

    /// Output solution file (stdout if omitted)
    #[arg(short = 'o', long)]
    output: Option<String>,

    /// Start time, "y/m/d h:m:s"
    #[arg(long = "ts")]
    ts: Option<String>,

    /// End time, "y/m/d h:m:s"
    #[arg(long = "te")]
    te: Option<String>,

    /// Processing interval / window length (seconds); 0 disables windowing
    #[arg(short = 'i', long = "ti", default_value_t = 0.0)]
    ti: f64,

    /// Positioning mode: 0 static, 1 kinematic
    #[arg(short = 'p', long = "mode", default_value_t = 0)]
    mode: u8,

    /// Elevation mask (degrees)
    #[arg(short = 'm', long = "elmask", default_value_t = 15.0)]
    elmask: f64,

    /// Enabled constellations, e.g. "G,R,E"
    #[arg(long = "sys", default_value = "G")]
    sys: String,

    /// Frequency count: 1, 2 or 3
    #[arg(short = 'f', long = "freq", default_value_t = 2)]
    freq: u8,

    /// AR ratio threshold
    #[arg(short = 'v', long = "ratio", default_value_t = 3.0)]
    ratio: f64,

    /// Backward processing
    #[arg(short = 'b', long)]
    backward: bool,

    /// Combined (forward+backward smoothed) processing
    #[arg(short = 'c', long)]
    combined: bool,

    /// Instantaneous (single-epoch) ambiguity resolution
    #[arg(short = 'I', long = "instant-ar")]
    instant_ar: bool,

    /// Fix-and-hold ambiguity resolution
    #[arg(short = 'H', long = "hold")]
    hold: bool,

    /// Baseline length constraint, "length_m,std_m"
    #[arg(long = "bl")]
    baseline: Option<String>,

    /// Output format: llh, xyz, enu, nmea, status
    #[arg(short = 'e', long = "format", default_value = "llh")]
    format: String,

    /// NMEA GGA output (shorthand for `-e nmea`)
    #[arg(short = 'n', long)]
    nmea: bool,

    /// Degrees-minutes-seconds formatting
    #[arg(short = 'g', long)]
    dms: bool,

    /// Formatted (calendar) time output
    #[arg(short = 't', long)]
    formatted_time: bool,

    /// UTC output instead of GPST
    #[arg(short = 'u', long)]
    utc: bool,

    /// Decimal places
    #[arg(short = 'd', long, default_value_t = 4)]
    decimals: u8,

    /// Field separator
    #[arg(short = 's', long, default_value = " ")]
    separator: String,

    /// Reference position, ECEF "x y z"
    #[arg(short = 'r', long = "ref-xyz", num_args = 3)]
    ref_xyz: Option<Vec<f64>>,

    /// Reference position, geodetic "lat lon hgt" (degrees, degrees, metres)
    #[arg(short = 'l', long = "ref-llh", num_args = 3)]
    ref_llh: Option<Vec<f64>>,

    /// Status output verbosity
    #[arg(short = 'y', long = "status-level", default_value_t = 0)]
    status_level: u8,

    /// Trace log verbosity
    #[arg(short = 'x', long = "trace-level", default_value_t = 0)]
    trace_level: u8,

    /// Config file (unused unless built with the `serde` feature)
    #[arg(short = 'k', long = "config")]
    config_file: Option<String>,
}

fn parse_datetime(s: &str) -> Result<Instant> {
    let mut parts = s.split(|c: char| c == '/' || c == ' ' || c == ':').filter(|p| !p.is_empty());
    let year: i32 = parts.next().and_then(|p| p.parse().ok()).ok_or(Error::Io("bad -ts/-te date".into()))?;
    let month: u8 = parts.next().and_then(|p| p.parse().ok()).ok_or(Error::Io("bad -ts/-te date".into()))?;
    let day: u8 = parts.next().and_then(|p| p.parse().ok()).ok_or(Error::Io("bad -ts/-te date".into()))?;
    let hour: u8 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    let minute: u8 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    let second: u8 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    let epoch = hifitime::Epoch::from_gregorian_utc(year, month, day, hour, minute, second, 0);
    Ok(Instant::from_gpst_epoch(epoch))
}

fn build_config(args: &Args) -> Result<Config> {
    let mode = if args.mode == 0 { PositioningMode::Static } else { PositioningMode::Kinematic };
    let mut config = Config::default_for(mode);

    config.direction = if args.combined {
        ProcessingDirection::Combined
    } else if args.backward {
        ProcessingDirection::Backward
    } else {
        ProcessingDirection::Forward
    };
    config.elevation_mask_deg = args.elmask;
    config.min_sv_elev_deg = args.elmask;
    config.frequency_count = args.freq;
    // `-v` is a single value, not a range: pin both bounds to it so
    // `ratio_threshold()`'s min==max shortcut applies directly.
    config.ratio_threshold_min = args.ratio;
    config.ratio_threshold_max = args.ratio;
    config.instant_ar = args.instant_ar;
    config.fix_and_hold = args.hold;

    config.enabled_constellations = args
        .sys
        .split(',')
        .filter_map(|tok| Constellation::from_str(tok.trim()).ok())
        .collect();
    if config.enabled_constellations.is_empty() {
        config.enabled_constellations.push(Constellation::GPS);
    }

    if let Some(bl) = &args.baseline {
        let mut fields = bl.split(',');
        let length_m: f64 = fields.next().and_then(|s| s.parse().ok()).unwrap_or(0.0);
        let std_m: f64 = fields.next().and_then(|s| s.parse().ok()).unwrap_or(1.0);
        config.baseline = Some(BaselineConstraint { length_m, std_m });
    }

    config.output_format = if args.nmea {
        OutputFormat::Nmea
    } else {
        match args.format.to_lowercase().as_str() {
            "xyz" => OutputFormat::Xyz,
            "enu" => OutputFormat::Enu,
            "nmea" => OutputFormat::Nmea,
            "status" => OutputFormat::Status,
            _ => OutputFormat::Llh,
        }
    };
    config.nmea = args.nmea;
    config.dms = args.dms;
    config.formatted_time = args.formatted_time;
    config.utc = args.utc;
    config.decimals = args.decimals;
    config.separator = args.separator.clone();
    config.status_level = args.status_level;
    config.trace_level = args.trace_level;

    if let Some(xyz) = &args.ref_xyz {
        config.reference_ecef = Some([xyz[0], xyz[1], xyz[2]]);
    } else if let Some(llh) = &args.ref_llh {
        config.reference_llh = Some([llh[0], llh[1], llh[2]]);
        config.reference_ecef = Some(geodetic_to_ecef(llh[0].to_radians(), llh[1].to_radians(), llh[2]));
    }

    Ok(config)
}

/// Sniffs a RINEX file's "RINEX VERSION / TYPE" line to tell OBS from NAV;
/// SP3/IONEX/SBAS are recognised by their first-line marker instead.
enum FileKind {
    Obs,
    Nav,
    Sp3,
    Ionex,
    SbasLog,
    Unknown,
}

fn sniff_kind(content: &str) -> FileKind {
    if let Some(first) = content.lines().next() {
        if first.starts_with("#c") || first.starts_with("#d") {
            return FileKind::Sp3;
        }
    }
    for line in content.lines().take(5) {
        let (_, label) = parsing::split_header_line(line);
        let label = label.trim();
        if label == "RINEX VERSION / TYPE" {
            let ty = line.get(20..21).unwrap_or("");
            return match ty {
                "O" => FileKind::Obs,
                "N" | "G" | "H" | "C" | "L" | "I" | "J" => FileKind::Nav,
                _ => FileKind::Unknown,
            };
        }
        if label == "IONOSPHERE MAPS" || line.contains("IONEX VERSION") {
            return FileKind::Ionex;
        }
    }
    // SBAS logs have no header at all: "week tow prn <hex...>".
    if content
        .lines()
        .find(|l| !l.trim().is_empty())
        .map(|l| l.split_whitespace().count() >= 31)
        .unwrap_or(false)
    {
        return FileKind::SbasLog;
    }
    FileKind::Unknown
}

fn load_files(paths: &[String], rover_path_hint: Option<&str>) -> Result<Context> {
    let mut ctx = Context::new(2);

    for path in paths {
        let content = fs::read_to_string(path).map_err(|e| Error::Io(format!("{path}: {e}")))?;
        match sniff_kind(&content) {
            FileKind::Obs => {
                let header = parsing::rinex_obs::parse_header(&content)?;
                let is_base = rover_path_hint.map(|hint| hint != path.as_str()).unwrap_or(false);
                let receiver = if is_base { Receiver::Base } else { Receiver::Rover };
                let lines: Vec<&str> = content.lines().collect();
                let mut i = 0usize;
                // Skip the header, counted by re-scanning for END OF HEADER.
                while i < lines.len() {
                    let (_, label) = parsing::split_header_line(lines[i]);
                    i += 1;
                    if label.trim() == "END OF HEADER" {
                        break;
                    }
                }
                while i < lines.len() {
                    match parsing::rinex_obs::parse_epoch(&header, receiver, &lines[i..]) {
                        Ok((records, consumed)) => {
                            if consumed == 0 {
                                break;
                            }
                            ctx.observations.extend(records)?;
                            i += consumed;
                        }
                        Err(_) => i += 1,
                    }
                }
            }
            FileKind::Nav => {
                let header = parsing::rinex_nav::parse_header(&content)?;
                if ctx.klobuchar.is_none() {
                    ctx.klobuchar = header.klobuchar;
                }
                let lines: Vec<&str> = content.lines().collect();
                let mut i = 0usize;
                while i < lines.len() {
                    let (_, label) = parsing::split_header_line(lines[i]);
                    i += 1;
                    if label.trim() == "END OF HEADER" {
                        break;
                    }
                }
                while i < lines.len() {
                    if lines[i].trim().is_empty() {
                        i += 1;
                        continue;
                    }
                    match parsing::rinex_nav::parse_record(&header, Constellation::GPS, &lines[i..]) {
                        Ok((eph, consumed)) => {
                            let ring_capacity = ctx.ephemeris_ring_capacity;
                            let ring = ctx
                                .broadcast_ephemeris
                                .entry(eph.satellite.0 as u16)
                                .or_insert_with(|| rtk_core::store::EphemerisRing::new(ring_capacity));
                            ring.push(eph);
                            i += consumed;
                        }
                        Err(_) => i += 1,
                    }
                }
            }
            FileKind::Sp3 => {
                let mut lines = content.lines().peekable();
                let header = parsing::sp3::parse_header(&mut lines)?;
                let body: String = lines.collect::<Vec<_>>().join("\n");
                let (orbits, clocks) = parsing::sp3::parse_body(&header, &body)?;
                ctx.precise_orbits.extend(orbits)?;
                ctx.precise_clocks.extend(clocks)?;
            }
            FileKind::Ionex => {
                let (header, _) = parsing::ionex::parse_header(&content)?;
                let maps = parsing::ionex::parse_body(&header, &content)?;
                ctx.ionex_maps.extend(maps)?;
            }
            FileKind::SbasLog => {
                let (messages, _skipped) = parsing::sbas_log::parse_log(&content);
                ctx.sbas_messages.extend(messages)?;
            }
            FileKind::Unknown => {
                log::warn!("{path}: could not identify file type, skipping");
            }
        }
    }

    ctx.sort_observations();
    ctx.unique_nav();
    ctx.combine_precise();
    Ok(ctx)
}

/// Epoch source pulling rover/base observations and broadcast ephemerides
/// straight out of a loaded [`Context`]. Single-differences are formed
/// against the nearest base epoch within one sampling interval. Cycle-slip
/// inputs (section 4.G) are rebuilt each epoch from the raw observations:
/// LLI bits straight off the record, the geometry-free combination from the
/// rover's own L1/L2 phase, and the doppler-vs-phase-rate deviation from
/// `prev_rover_phase`, the only piece of state this source must carry
/// itself (the geometry-free history lives on the filter's own tracking
/// state once handed a slip).
struct ContextEpochSource<'a> {
    ctx: &'a Context,
    config: &'a Config,
    running_position: [f64; 3],
    /// Rover phase (cycles) and timestamp last observed per (satellite,
    /// freq index), used to derive a phase rate for the doppler-vs-phase
    /// slip test.
    prev_rover_phase: HashMap<(SatIndex, usize), (f64, Instant)>,
}

fn frequency_hz(_constellation: Constellation, freq_index: usize) -> f64 {
    use rtk_core::constants::{FREQ_L1, FREQ_L2, FREQ_L5};
    match freq_index {
        0 => FREQ_L1,
        1 => FREQ_L2,
        _ => FREQ_L5,
    }
}

fn elevation_of(sat_pos: [f64; 3], receiver_pos: [f64; 3]) -> f64 {
    let los = [sat_pos[0] - receiver_pos[0], sat_pos[1] - receiver_pos[1], sat_pos[2] - receiver_pos[2]];
    let range = (los[0] * los[0] + los[1] * los[1] + los[2] * los[2]).sqrt().max(1.0);
    let unit = [los[0] / range, los[1] / range, los[2] / range];
    let (lat, lon, _) = rtk_core::solution::ecef_to_geodetic(receiver_pos);
    let (sin_lat, cos_lat) = lat.sin_cos();
    let (sin_lon, cos_lon) = lon.sin_cos();
    let up = [cos_lat * cos_lon, cos_lat * sin_lon, sin_lat];
    let sin_el = unit[0] * up[0] + unit[1] * up[1] + unit[2] * up[2];
    sin_el.clamp(-1.0, 1.0).asin()
}

fn azimuth_of(sat_pos: [f64; 3], receiver_pos: [f64; 3]) -> f64 {
    let los = [sat_pos[0] - receiver_pos[0], sat_pos[1] - receiver_pos[1], sat_pos[2] - receiver_pos[2]];
    let (lat, lon, _) = rtk_core::solution::ecef_to_geodetic(receiver_pos);
    let (sin_lat, cos_lat) = lat.sin_cos();
    let (sin_lon, cos_lon) = lon.sin_cos();
    let east = [-sin_lon, cos_lon, 0.0];
    let north = [-sin_lat * cos_lon, -sin_lat * sin_lon, cos_lat];
    let e = los[0] * east[0] + los[1] * east[1] + los[2] * east[2];
    let n = los[0] * north[0] + los[1] * north[1] + los[2] * north[2];
    e.atan2(n).rem_euclid(2.0 * std::f64::consts::PI)
}

impl<'a> EpochSource for ContextEpochSource<'a> {
    fn epochs(&mut self, window: (Instant, Instant)) -> Result<Vec<EpochInput>> {
        let mut rover_times: Vec<Instant> = Vec::new();
        for obs in self.ctx.observations.iter() {
            if obs.receiver != Receiver::Rover {
                continue;
            }
            if obs.time.diff_seconds(window.0) < 0.0 || obs.time.diff_seconds(window.1) >= 0.0 {
                continue;
            }
            if !rover_times.iter().any(|t| t.diff_seconds(obs.time).abs() < 1e-6) {
                rover_times.push(obs.time);
            }
        }
        rover_times.sort_by(|a, b| a.diff_seconds(*b).partial_cmp(&0.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut inputs = Vec::with_capacity(rover_times.len());
        for time in rover_times {
            if let Some(epoch) = self.build_epoch(time) {
                inputs.push(epoch);
            }
        }
        Ok(inputs)
    }
}

impl<'a> ContextEpochSource<'a> {
    fn observations_at(&self, time: Instant, receiver: Receiver) -> Vec<&'a rtk_core::store::observation::ObservationRecord> {
        self.ctx
            .observations
            .iter()
            .filter(|o| o.receiver == receiver && o.time.diff_seconds(time).abs() < 1e-6)
            .collect()
    }

    fn nearest_base_time(&self, time: Instant) -> Option<Instant> {
        let mut best: Option<(Instant, f64)> = None;
        for obs in self.ctx.observations.iter() {
            if obs.receiver != Receiver::Base {
                continue;
            }
            let dt = obs.time.diff_seconds(time).abs();
            if dt <= self.config.sampling_interval_s.max(1.0) {
                if best.map(|(_, best_dt)| dt < best_dt).unwrap_or(true) {
                    best = Some((obs.time, dt));
                }
            }
        }
        best.map(|(t, _)| t)
    }

    fn build_epoch(&mut self, time: Instant) -> Option<EpochInput> {
        let rover_obs = self.observations_at(time, Receiver::Rover);
        if rover_obs.is_empty() {
            return None;
        }

        let (rx_lat_rad, rx_lon_rad, rx_alt_m) = rtk_core::solution::ecef_to_geodetic(self.running_position);
        let gpst_tow = (time.whole_seconds.rem_euclid(rtk_core::time::SECONDS_PER_WEEK as i64)) as f64 + time.fractional;

        let mut spp_candidates = Vec::new();
        let mut tracking_updates = Vec::new();
        for obs in &rover_obs {
            if !self.config.enabled_constellations.contains(&obs.satellite.to_sv().map(|sv| sv.constellation).unwrap_or(Constellation::GPS)) {
                continue;
            }
            let Some(slot) = obs.slots.first() else { continue };
            let Some(pseudorange_m) = slot.pseudorange_m else { continue };
            let Ok(state) = evaluator::sat_pos(self.ctx, time, obs.satellite, EphemerisSource::Broadcast) else { continue };
            let elevation_rad = elevation_of(state.position_m, self.running_position);
            if elevation_rad < self.config.elevation_mask_deg.to_radians() {
                continue;
            }
            let azimuth_rad = azimuth_of(state.position_m, self.running_position);
            let constellation = obs.satellite.to_sv().map(|sv| sv.constellation).unwrap_or(Constellation::GPS);
            let snr_dbhz = slot.snr_millidbhz.map(|v| v as f64 / 1000.0).unwrap_or(45.0);
            let healthy = evaluator::broadcast_health(self.ctx, time, obs.satellite).map(|h| h == 0).unwrap_or(true);
            let tropo_delay_m = rtk_core::atmosphere::tropo_delay(rx_lat_rad.to_degrees(), rx_alt_m, elevation_rad);
            let iono_delay_m = self
                .ctx
                .klobuchar
                .as_ref()
                .map(|kp| rtk_core::atmosphere::klobuchar::klobuchar_delay(kp, rx_lat_rad, rx_lon_rad, elevation_rad, azimuth_rad, gpst_tow))
                .unwrap_or(0.0);
            spp_candidates.push(rtk_core::spp::SppCandidate {
                satellite: obs.satellite,
                constellation,
                sat_position_m: state.position_m,
                sat_clock_bias_s: state.clock_bias_s,
                pseudorange_m,
                elevation_rad,
                tropo_delay_m,
                iono_delay_m,
                // The broadcast TGD is already folded into `sat_clock_bias_s`
                // by the evaluator (section 4.D); adding it again here would
                // double-count it.
                tgd_m: 0.0,
                variance_m2: state.variance_m2.max(1.0),
                snr_dbhz,
                healthy,
            });
            tracking_updates.push(TrackingUpdate {
                satellite: obs.satellite,
                elevation_rad,
                azimuth_rad,
                valid_rover: true,
                valid_base: false,
            });
        }

        let spp_candidates = rtk_core::spp::elevation_filter(
            spp_candidates,
            self.config.min_sv_elev_deg.to_radians(),
            self.config.min_sv_snr_dbhz,
        );
        if spp_candidates.len() >= 4 {
            if let Ok(spp) = rtk_core::spp::solve(&spp_candidates, self.running_position, self.config.raim_chi2_threshold) {
                self.running_position = spp.position_ecef_m;
            }
        }

        // Cycle-slip inputs (section 4.G), rover-side: the geometry-free
        // combination needs only this epoch's L1/L2 phase, but the
        // doppler-vs-phase-rate deviation needs the rover's own previous
        // phase, tracked in `prev_rover_phase` since the filter's tracking
        // state only remembers the geometry-free value.
        let mut raw_doppler_phase_diff: HashMap<(SatIndex, usize), f64> = HashMap::new();
        let mut geometry_free_now: HashMap<SatIndex, f64> = HashMap::new();
        for obs in &rover_obs {
            let constellation = obs.satellite.to_sv().map(|sv| sv.constellation).unwrap_or(Constellation::GPS);
            if let (Some(l1), Some(l2)) = (obs.slots.first().and_then(|s| s.phase_cycles), obs.slots.get(1).and_then(|s| s.phase_cycles)) {
                let lambda1 = rtk_core::constants::CLIGHT / frequency_hz(constellation, 0);
                let lambda2 = rtk_core::constants::CLIGHT / frequency_hz(constellation, 1);
                geometry_free_now.insert(obs.satellite, l1 * lambda1 - l2 * lambda2);
            }
            for (freq, slot) in obs.slots.iter().enumerate().take(self.config.frequency_count as usize) {
                let key = (obs.satellite, freq);
                let (Some(phase_cycles), Some(doppler_hz)) = (slot.phase_cycles, slot.doppler_hz) else {
                    continue;
                };
                let wavelength = rtk_core::constants::CLIGHT / frequency_hz(constellation, freq);
                if let Some(&(prev_phase, prev_time)) = self.prev_rover_phase.get(&key) {
                    let dt = time.diff_seconds(prev_time);
                    if dt.abs() > 1e-6 {
                        let phase_rate_mps = (phase_cycles - prev_phase) * wavelength / dt;
                        let doppler_rate_mps = -doppler_hz * wavelength;
                        raw_doppler_phase_diff.insert(key, phase_rate_mps - doppler_rate_mps);
                    }
                }
                self.prev_rover_phase.insert(key, (phase_cycles, time));
            }
        }
        let epoch_mean_diff = if raw_doppler_phase_diff.is_empty() {
            0.0
        } else {
            raw_doppler_phase_diff.values().sum::<f64>() / raw_doppler_phase_diff.len() as f64
        };

        let mut sd_measurements = Vec::new();
        let mut slips = Vec::new();
        let mut ambiguity_candidates = Vec::new();
        let mut baseline_m = 0.0;
        let mut base_position_ecef_m = None;

        if let Some(base_time) = self.nearest_base_time(time) {
            if let Some(base_pos) = self.config.reference_ecef {
                base_position_ecef_m = Some(base_pos);
                let d = [
                    self.running_position[0] - base_pos[0],
                    self.running_position[1] - base_pos[1],
                    self.running_position[2] - base_pos[2],
                ];
                baseline_m = (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt();
            }

            let base_obs = self.observations_at(base_time, Receiver::Base);
            let mut base_by_sat: HashMap<SatIndex, &rtk_core::store::observation::ObservationRecord> = HashMap::new();
            for obs in &base_obs {
                base_by_sat.insert(obs.satellite, obs);
            }

            for obs in &rover_obs {
                let Some(base) = base_by_sat.get(&obs.satellite) else { continue };
                let Ok(state) = evaluator::sat_pos(self.ctx, time, obs.satellite, EphemerisSource::Broadcast) else { continue };
                let constellation = obs.satellite.to_sv().map(|sv| sv.constellation).unwrap_or(Constellation::GPS);
                let elevation_rad = elevation_of(state.position_m, self.running_position);

                for (freq, (rover_slot, base_slot)) in obs.slots.iter().zip(base.slots.iter()).enumerate() {
                    if freq >= self.config.frequency_count as usize {
                        break;
                    }
                    let snr_rover_dbhz = rover_slot.snr_millidbhz.map(|v| v as f64 / 1000.0).unwrap_or(45.0);
                    let snr_base_dbhz = base_slot.snr_millidbhz.map(|v| v as f64 / 1000.0).unwrap_or(45.0);
                    if let (Some(rp), Some(bp)) = (rover_slot.phase_cycles, base_slot.phase_cycles) {
                        let wavelength = rtk_core::constants::CLIGHT / frequency_hz(constellation, freq);
                        let sd_residual_m = (rp - bp) * wavelength;
                        let los = [
                            state.position_m[0] - self.running_position[0],
                            state.position_m[1] - self.running_position[1],
                            state.position_m[2] - self.running_position[2],
                        ];
                        let range = (los[0] * los[0] + los[1] * los[1] + los[2] * los[2]).sqrt().max(1.0);
                        let los_rover = [los[0] / range, los[1] / range, los[2] / range];
                        let lli_slip_rover = rover_slot.lli.intersects(Lli::SLIP);
                        let lli_slip_base = base_slot.lli.intersects(Lli::SLIP);
                        let slip_free = !lli_slip_rover && !lli_slip_base;
                        let variance_m2 = sd_variance_m2(
                            &SdVarianceInputs {
                                kind: ObservableKind::Phase,
                                constellation,
                                elevation_rover_rad: elevation_rad,
                                snr_rover_dbhz,
                                snr_base_dbhz,
                                baseline_m,
                                receiver_std_rover_m: rover_slot.phase_std_cycles.map(|c| c * wavelength),
                                receiver_std_base_m: base_slot.phase_std_cycles.map(|c| c * wavelength),
                                dt_s: self.config.sampling_interval_s,
                            },
                            self.config,
                        );

                        sd_measurements.push(SdMeasurement {
                            satellite: obs.satellite,
                            constellation,
                            freq,
                            frequency_hz: frequency_hz(constellation, freq),
                            kind: ObservableKind::Phase,
                            sd_residual_m,
                            elevation_rover_rad: elevation_rad,
                            slip_free,
                            variance_m2,
                            los_rover,
                            wet_mapping: rtk_core::atmosphere::niell_mapping(elevation_rad),
                            // Short-baseline approximation: no separate base-side
                            // sky state is tracked, so base geometry borrows the
                            // rover's elevation (see `ContextEpochSource`).
                            wet_mapping_base: rtk_core::atmosphere::niell_mapping(elevation_rad),
                        });
                        ambiguity_candidates.push(BiasCandidate {
                            satellite: obs.satellite,
                            constellation,
                            freq,
                            slip_free,
                            elevation_rad,
                        });

                        let initial_value = match (rover_slot.pseudorange_m, base_slot.pseudorange_m) {
                            (Some(rc), Some(bc)) => Some((rp - bp) - (rc - bc) * frequency_hz(constellation, freq) / rtk_core::constants::CLIGHT),
                            _ => None,
                        };
                        slips.push(SlipInput {
                            satellite: obs.satellite,
                            freq,
                            lli_slip_rover,
                            lli_slip_base,
                            geometry_free_now_m: if freq <= 1 { geometry_free_now.get(&obs.satellite).copied() } else { None },
                            doppler_phase_diff_now: raw_doppler_phase_diff.get(&(obs.satellite, freq)).map(|raw| raw - epoch_mean_diff),
                            outage_this_epoch: false,
                            initial_value,
                        });
                    }
                    if let (Some(rp), Some(bp)) = (rover_slot.pseudorange_m, base_slot.pseudorange_m) {
                        let variance_m2 = sd_variance_m2(
                            &SdVarianceInputs {
                                kind: ObservableKind::PseudoRange,
                                constellation,
                                elevation_rover_rad: elevation_rad,
                                snr_rover_dbhz,
                                snr_base_dbhz,
                                baseline_m,
                                receiver_std_rover_m: rover_slot.code_std_m,
                                receiver_std_base_m: base_slot.code_std_m,
                                dt_s: self.config.sampling_interval_s,
                            },
                            self.config,
                        );
                        sd_measurements.push(SdMeasurement {
                            satellite: obs.satellite,
                            constellation,
                            freq,
                            frequency_hz: frequency_hz(constellation, freq),
                            kind: ObservableKind::PseudoRange,
                            sd_residual_m: rp - bp,
                            elevation_rover_rad: elevation_rad,
                            slip_free: true,
                            variance_m2,
                            los_rover: [0.0, 0.0, 0.0],
                            wet_mapping: rtk_core::atmosphere::niell_mapping(elevation_rad),
                            wet_mapping_base: rtk_core::atmosphere::niell_mapping(elevation_rad),
                        });
                    }
                }
            }
        }

        Some(EpochInput {
            time,
            nominal_dt_s: self.config.sampling_interval_s,
            spp_candidates,
            sd_measurements,
            slips,
            ambiguity_candidates,
            tracking_updates,
            baseline_m,
            base_position_ecef_m,
        })
    }
}

fn run() -> Result<()> {
    rtk_core::logging::init();
    let args = Args::parse();

    let config = build_config(&args)?;
    let rover_hint = args.files.first().map(|s| s.as_str());
    let ctx = load_files(&args.files, rover_hint)?;

    let ts = args.ts.as_deref().map(parse_datetime).transpose()?.unwrap_or(Instant::new(0, 0.0));
    let te = match args.te.as_deref().map(parse_datetime).transpose()? {
        Some(t) => t,
        None => ctx
            .observations
            .iter()
            .map(|o| o.time)
            .fold(ts, |acc, t| if t.diff_seconds(acc) > 0.0 { t } else { acc })
            .add_seconds(1.0),
    };

    let mut source = ContextEpochSource {
        ctx: &ctx,
        config: &config,
        running_position: config.reference_ecef.unwrap_or([0.0, 0.0, 0.0]),
        prev_rover_phase: HashMap::new(),
    };

    let static_solution = config.mode == PositioningMode::Static;
    let solutions = driver::run_session(&mut source, &config, ts, te, args.ti, static_solution)?;

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(fs::File::create(path).map_err(|e| Error::Io(e.to_string()))?),
        None => Box::new(std::io::stdout()),
    };
    for solution in &solutions {
        writeln!(out, "{}", format_solution(solution, &config)).map_err(|e| Error::Io(e.to_string()))?;
    }

    log::info!("rtkpost: {} epochs processed, {} solutions emitted", ctx.nepoch, solutions.len());
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("rtkpost: {e}");
            ExitCode::FAILURE
        }
    }
}
