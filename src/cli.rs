//! Command-line surface of the analysis pipeline.

use crate::colormap::{BinaryColormap, Colormap};
use crate::composite;
use crate::dehnen::{hydrostatic_mass, DehnenProfile};
use crate::driver::{self, figure_dir, figure_name, run_timestamp};
use crate::image::{make_plot, ContourOptions, PlotOptions};
use crate::mond::{equilibrium_temperature, EquilibriumOptions};
use crate::movify;
use crate::profile::{
    make_profile, make_profile_plot, make_profiles_plot, ProfileOptions, ProfileProduct,
};
use crate::registry::Quantity;
use crate::view::{SnapView, ViewParams};
use clap::{Args, Parser, Subcommand, ValueEnum};
use cluster_common::{config, ClusterError, GravityModel, SimulationLog};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use sph_kit::binning::{bin_centers, bin_edges, enclosed_mass, BinSpacing};
use sph_kit::ramses::output_number;
use sph_kit::snapshot::Family;
use sph_kit::units::Unit;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Post-processing and orchestration toolkit for cluster-collision
/// simulations.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// 0 = error, 1 = warn, 2 = info, 3 = debug, 4 = trace. Defaults to
    /// the configured logging policy.
    #[arg(long = "logging_level", global = true)]
    pub logging_level: Option<u32>,

    /// Where log records go.
    #[arg(long = "output_type", global = true, value_enum, default_value_t = OutputTarget::Stdout)]
    pub output_type: OutputTarget,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputTarget {
    #[value(name = "FILE")]
    File,
    #[value(name = "STDOUT")]
    Stdout,
}

/// Selects the simulation to operate on.
#[derive(Args, Debug, Clone)]
pub struct SelectorArgs {
    /// Name the simulation was cataloged under.
    #[arg(long = "simulation_name", conflicts_with = "simulation_directory")]
    pub simulation_name: Option<String>,

    /// Explicit simulation output directory.
    #[arg(long = "simulation_directory")]
    pub simulation_directory: Option<PathBuf>,
}

impl SelectorArgs {
    /// Resolves to (simulation name, output directory). A catalog lookup
    /// with several matches takes the first and warns.
    pub fn resolve(&self) -> Result<(String, PathBuf), ClusterError> {
        if let Some(name) = &self.simulation_name {
            let log_path = SimulationLog::default_path(&config().paths.namelists_root);
            let log = SimulationLog::load(log_path)?;
            let locations = log.match_field("SimulationName", "Location", name);
            let location = match locations.as_slice() {
                [] => {
                    return Err(ClusterError::SimBackend(format!(
                        "simulation '{name}' is not in the catalog (or has no Location)"
                    )))
                }
                [only] => only.clone(),
                [first, ..] => {
                    warn!(
                        "{} catalog entries match '{name}'; taking the first",
                        locations.len()
                    );
                    first.clone()
                }
            };
            let dir = PathBuf::from(location);
            if !dir.is_dir() {
                return Err(ClusterError::SimBackend(format!(
                    "cataloged directory {} does not exist",
                    dir.display()
                )));
            }
            return Ok((name.clone(), dir));
        }
        if let Some(dir) = &self.simulation_directory {
            if !dir.is_dir() {
                return Err(ClusterError::SimBackend(format!(
                    "simulation directory {} does not exist",
                    dir.display()
                )));
            }
            let name = dir
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("simulation")
                .to_string();
            return Ok((name, dir.clone()));
        }
        Err(ClusterError::SimBackend(
            "pass either --simulation_name or --simulation_directory".into(),
        ))
    }
}

/// Camera and rasterization flags shared by the figure subcommands.
#[derive(Args, Debug, Clone)]
pub struct RenderArgs {
    /// Image side length in the configured length unit.
    #[arg(long, default_value_t = 2000.0)]
    pub width: f64,

    /// Display unit of the rendered quantity.
    #[arg(long)]
    pub units: Option<String>,

    #[arg(long, default_value_t = 512)]
    pub resolution: usize,

    /// Color range: vmin vmax.
    #[arg(long, num_args = 2, value_names = ["VMIN", "VMAX"])]
    pub vbounds: Option<Vec<f64>>,

    /// Families to render (gas, dm, stars).
    #[arg(long, num_args = 1..)]
    pub families: Option<Vec<String>>,

    #[arg(long)]
    pub colormap: Option<String>,

    /// Force a log color scale.
    #[arg(long)]
    pub logarithmic: bool,

    /// Line-of-sight average instead of a thin slice.
    #[arg(long)]
    pub integrate: bool,

    /// View origin offset in kpc: x y z.
    #[arg(long, num_args = 3, value_names = ["X", "Y", "Z"])]
    pub origin: Option<Vec<f64>>,

    /// Camera angles in degrees: azimuth elevation.
    #[arg(long, num_args = 2, value_names = ["AZ", "ELEV"])]
    pub camera: Option<Vec<f64>>,

    /// Overlay contours of a second quantity.
    #[arg(long = "contour_quantity")]
    pub contour_quantity: Option<String>,

    /// Gaussian pre-smoothing of the contour field, in pixels.
    #[arg(long = "contour_smooth")]
    pub contour_smooth: Option<f64>,
}

impl RenderArgs {
    pub fn view_params(&self) -> ViewParams {
        let origin = match &self.origin {
            Some(v) => [v[0], v[1], v[2]],
            None => [0.0; 3],
        };
        let (az, el) = match &self.camera {
            Some(v) => (v[0], v[1]),
            None => (0.0, 0.0),
        };
        ViewParams {
            origin,
            azimuth_deg: az,
            elevation_deg: el,
        }
    }

    pub fn plot_options(&self) -> Result<PlotOptions, ClusterError> {
        let units = match &self.units {
            Some(s) => Some(
                Unit::from_str(s).map_err(|e| ClusterError::Snapshot(e.to_string()))?,
            ),
            None => None,
        };
        let families = match &self.families {
            Some(list) => {
                let mut parsed = Vec::with_capacity(list.len());
                for f in list {
                    parsed.push(
                        Family::from_str(f)
                            .map_err(|e| ClusterError::Snapshot(e.to_string()))?,
                    );
                }
                Some(parsed)
            }
            None => None,
        };
        let colormap = match &self.colormap {
            Some(c) => Some(Colormap::from_str(c)?),
            None => None,
        };
        let (vmin, vmax) = match &self.vbounds {
            Some(v) => (Some(v[0]), Some(v[1])),
            None => (None, None),
        };
        let contours = match &self.contour_quantity {
            Some(q) => Some(ContourOptions {
                quantity: Quantity::from_str(q)?,
                levels: 5,
                smooth: self.contour_smooth,
            }),
            None => None,
        };
        Ok(PlotOptions {
            width: self.width,
            resolution: self.resolution,
            units,
            vmin,
            vmax,
            log: if self.logarithmic { Some(true) } else { None },
            colormap,
            families,
            av_z: self.integrate,
            contours,
        })
    }
}

/// Radial-binning flags of the profile subcommands.
#[derive(Args, Debug, Clone)]
pub struct ProfileArgs {
    /// 2 for view-plane radii, 3 for spherical.
    #[arg(long, default_value_t = 3)]
    pub ndim: usize,

    #[arg(long, default_value_t = 64)]
    pub nbins: usize,

    /// lin, log or equaln.
    #[arg(long = "bin_spacing", default_value = "log")]
    pub bin_spacing: String,

    #[arg(long)]
    pub rmin: Option<f64>,

    #[arg(long)]
    pub rmax: Option<f64>,

    /// Restrict the profile to one family.
    #[arg(long)]
    pub family: Option<String>,

    /// Overlay an analytic Dehnen density curve: total mass (Msol), scale
    /// radius (kpc), inner slope. Meaningful on density profiles only.
    #[arg(long, num_args = 3, value_names = ["M", "A", "GAMMA"])]
    pub dehnen: Option<Vec<f64>>,
}

impl ProfileArgs {
    pub fn profile_options(&self, render: &RenderArgs) -> Result<ProfileOptions, ClusterError> {
        let spacing = BinSpacing::from_str(&self.bin_spacing)
            .map_err(|e| ClusterError::Snapshot(e.to_string()))?;
        let family = match &self.family {
            Some(f) => {
                Some(Family::from_str(f).map_err(|e| ClusterError::Snapshot(e.to_string()))?)
            }
            None => None,
        };
        let units = match &render.units {
            Some(s) => Some(
                Unit::from_str(s).map_err(|e| ClusterError::Snapshot(e.to_string()))?,
            ),
            None => None,
        };
        Ok(ProfileOptions {
            ndim: self.ndim,
            nbins: self.nbins,
            spacing,
            rmin: self.rmin,
            rmax: self.rmax,
            family,
            units,
            log: if render.logarithmic { Some(true) } else { None },
        })
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render one snapshot of a simulation as a colormap image.
    Image {
        #[command(flatten)]
        selector: SelectorArgs,
        #[command(flatten)]
        render: RenderArgs,
        /// Quantity tag (rho, temp, entropy, mach, xray, ...).
        #[arg(long)]
        quantity: String,
        /// Snapshot output number; default is the last output.
        #[arg(long)]
        snapshot: Option<u32>,
    },
    /// Render every snapshot of a simulation as colormap images.
    Images {
        #[command(flatten)]
        selector: SelectorArgs,
        #[command(flatten)]
        render: RenderArgs,
        #[arg(long)]
        quantity: String,
        /// Worker count of the snapshot fan-out.
        #[arg(long, default_value_t = 4)]
        nproc: usize,
    },
    /// Extract and plot one snapshot's radial profile.
    Profile {
        #[command(flatten)]
        selector: SelectorArgs,
        #[command(flatten)]
        render: RenderArgs,
        #[command(flatten)]
        profile: ProfileArgs,
        /// Quantity tags sharing the profile axis (and its unit).
        #[arg(long, num_args = 1..)]
        quantity: Vec<String>,
        #[arg(long)]
        snapshot: Option<u32>,
    },
    /// Plot radial profiles over every snapshot of a simulation.
    Profiles {
        #[command(flatten)]
        selector: SelectorArgs,
        #[command(flatten)]
        render: RenderArgs,
        #[command(flatten)]
        profile: ProfileArgs,
        #[arg(long, num_args = 1..)]
        quantity: Vec<String>,
        #[arg(long, default_value_t = 4)]
        nproc: usize,
    },
    /// Render the dark-matter / gas X-ray composite over every snapshot.
    Composite {
        #[command(flatten)]
        selector: SelectorArgs,
        #[command(flatten)]
        render: RenderArgs,
        /// Channel base colors: dark matter, then gas.
        #[arg(long, num_args = 1.., default_values = ["blue", "red"])]
        colors: Vec<String>,
        #[arg(long, default_value_t = 4)]
        nproc: usize,
    },
    /// Solve the hydrostatic-equilibrium gas temperature and compare it
    /// with the measured profile.
    Equilibrium {
        #[command(flatten)]
        selector: SelectorArgs,
        #[command(flatten)]
        render: RenderArgs,
        #[command(flatten)]
        profile: ProfileArgs,
        /// Gravity model: newtonian or mond.
        #[arg(long, default_value = "newtonian")]
        gravity: String,
        /// Analytic dark-matter halo instead of the particle masses:
        /// total mass (Msol), scale radius (kpc), inner slope.
        #[arg(long = "dehnen_dm", num_args = 3, value_names = ["M", "A", "GAMMA"])]
        dehnen_dm: Option<Vec<f64>>,
        #[arg(long)]
        snapshot: Option<u32>,
    },
    /// Encode figure directories into movies.
    Movify {
        /// Simulation whose figure tree to encode; default: whole tree.
        #[arg(long = "simulation_name")]
        simulation_name: Option<String>,
        #[arg(long, default_value_t = 24)]
        framerate: u32,
    },
    /// Swap a parameter file associated with a cataloged IC.
    ReplaceIcParam {
        /// IC-log key (the IC file basename).
        #[arg(long)]
        ic: String,
        #[arg(long)]
        old: String,
        #[arg(long)]
        new: String,
    },
}

fn progress_bar(len: u64, message: &'static str) -> ProgressBar {
    let bar = ProgressBar::new(len);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) [{eta}]")
            .expect("Invalid progress bar template")
            .progress_chars("#>-"),
    );
    bar.set_message(message);
    bar
}

fn parse_quantity_list(tags: &[String]) -> Result<Vec<Quantity>, ClusterError> {
    if tags.is_empty() {
        return Err(ClusterError::Snapshot("no quantity given".into()));
    }
    tags.iter().map(|t| Quantity::from_str(t)).collect()
}

/// Picks one output directory by number, defaulting to the last.
fn select_output(outputs: &[PathBuf], number: Option<u32>) -> Result<&PathBuf, ClusterError> {
    match number {
        None => outputs
            .last()
            .ok_or_else(|| ClusterError::SimBackend("simulation has no outputs".into())),
        Some(n) => outputs
            .iter()
            .find(|p| output_number(p).map(|m| m == n).unwrap_or(false))
            .ok_or_else(|| {
                ClusterError::SimBackend(format!("no output_{n:05} in this simulation"))
            }),
    }
}

/// One worker's image job: build a view, load, plot, drop.
fn image_job(
    snap_path: &Path,
    qty: Quantity,
    opts: &PlotOptions,
    view_params: ViewParams,
    out_dir: &Path,
) -> Result<(), ClusterError> {
    let number = output_number(snap_path).unwrap_or(0);
    let mut view = SnapView::new(view_params);
    view.load_snapshot(snap_path)?;
    let snap = view.snapshot_mut()?;
    let out = out_dir.join(figure_name(number));
    make_plot(snap, qty, opts, &out)?;
    view.release();
    Ok(())
}

pub fn run(cli: Cli) -> Result<(), ClusterError> {
    match cli.command {
        Command::Image {
            selector,
            render,
            quantity,
            snapshot,
        } => {
            let (sim_name, sim_dir) = selector.resolve()?;
            let qty = Quantity::from_str(&quantity)?;
            let opts = render.plot_options()?;
            let outputs = driver::find_snapshot_outputs(&sim_dir)?;
            let snap_path = select_output(&outputs, snapshot)?;
            let out_dir = figure_dir(
                &config().paths.figures_root,
                &sim_name,
                qty.tag(),
                opts.av_z,
                &run_timestamp(),
            );
            image_job(snap_path, qty, &opts, render.view_params(), &out_dir)?;
            info!("figure written under {}", out_dir.display());
            Ok(())
        }
        Command::Images {
            selector,
            render,
            quantity,
            nproc,
        } => {
            let (sim_name, sim_dir) = selector.resolve()?;
            let qty = Quantity::from_str(&quantity)?;
            let opts = render.plot_options()?;
            let view_params = render.view_params();
            let out_dir = figure_dir(
                &config().paths.figures_root,
                &sim_name,
                qty.tag(),
                opts.av_z,
                &run_timestamp(),
            );
            let total = driver::find_snapshot_outputs(&sim_dir)?.len();
            let bar = progress_bar(total as u64, "rendering snapshots");
            let stats = driver::run_over_simulation(&sim_dir, nproc, |snap_path| {
                let result = image_job(snap_path, qty, &opts, view_params, &out_dir);
                bar.inc(1);
                result
            })?;
            bar.finish_with_message("done");
            info!(
                "{} figures in {}, {} failures",
                stats.processed,
                out_dir.display(),
                stats.failed
            );
            Ok(())
        }
        Command::Profile {
            selector,
            render,
            profile,
            quantity,
            snapshot,
        } => {
            let (sim_name, sim_dir) = selector.resolve()?;
            let quantities = parse_quantity_list(&quantity)?;
            let popts = profile.profile_options(&render)?;
            let outputs = driver::find_snapshot_outputs(&sim_dir)?;
            let snap_path = select_output(&outputs, snapshot)?;
            let number = output_number(snap_path).unwrap_or(0);
            let out_dir = figure_dir(
                &config().paths.figures_root,
                &sim_name,
                &profile_tag(&quantities),
                false,
                &run_timestamp(),
            );

            let mut view = SnapView::new(render.view_params());
            view.load_snapshot(snap_path)?;
            let snap = view.snapshot_mut()?;
            let products: Result<Vec<_>, _> = quantities
                .iter()
                .map(|&q| make_profile(snap, q, &popts))
                .collect();
            let log_scale = render.logarithmic
                || quantities.iter().all(|q| q.info().log_default);

            // Optional analytic reference curve, in the profile's unit.
            let reference_fn;
            let reference: Option<(&str, crate::profile::ReferenceFn)> = match &profile.dehnen {
                Some(v) => {
                    let halo = DehnenProfile::new(v[0], v[1], v[2]);
                    let to_cgs = Unit::MsolPerKpc3.to_cgs();
                    reference_fn = move |r: f64| halo.density(r) * to_cgs;
                    Some(("Dehnen", &reference_fn))
                }
                None => None,
            };
            make_profile_plot(
                &products?,
                reference,
                log_scale,
                &out_dir.join(figure_name(number)),
            )?;
            info!("profile written under {}", out_dir.display());
            Ok(())
        }
        Command::Profiles {
            selector,
            render,
            profile,
            quantity,
            nproc,
        } => {
            let (sim_name, sim_dir) = selector.resolve()?;
            let quantities = parse_quantity_list(&quantity)?;
            let popts = profile.profile_options(&render)?;
            let view_params = render.view_params();
            let out_dir = figure_dir(
                &config().paths.figures_root,
                &sim_name,
                &profile_tag(&quantities),
                false,
                &run_timestamp(),
            );
            let log_scale = render.logarithmic
                || quantities.iter().all(|q| q.info().log_default);
            let total = driver::find_snapshot_outputs(&sim_dir)?.len();
            let bar = progress_bar(total as u64, "profiling snapshots");
            let stats = driver::run_over_simulation(&sim_dir, nproc, |snap_path| {
                let number = output_number(snap_path).unwrap_or(0);
                let mut view = SnapView::new(view_params);
                view.load_snapshot(snap_path)?;
                let snap = view.snapshot_mut()?;
                let products: Result<Vec<_>, _> = quantities
                    .iter()
                    .map(|&q| make_profile(snap, q, &popts))
                    .collect();
                let result = make_profile_plot(
                    &products?,
                    None,
                    log_scale,
                    &out_dir.join(figure_name(number)),
                )
                .map(|_| ());
                bar.inc(1);
                result
            })?;
            bar.finish_with_message("done");
            info!(
                "{} profiles in {}, {} failures",
                stats.processed,
                out_dir.display(),
                stats.failed
            );
            Ok(())
        }
        Command::Composite {
            selector,
            render,
            colors,
            nproc,
        } => {
            // Precondition: exactly one color per channel, before any work.
            if colors.len() != 2 {
                return Err(ClusterError::Snapshot(format!(
                    "--colors needs exactly 2 values (dm, gas), got {}",
                    colors.len()
                )));
            }
            let channel_colors = [
                BinaryColormap::named(&colors[0])?,
                BinaryColormap::named(&colors[1])?,
            ];
            let (sim_name, sim_dir) = selector.resolve()?;
            let opts = render.plot_options()?;
            let view_params = render.view_params();
            let out_dir = figure_dir(
                &config().paths.figures_root,
                &sim_name,
                "dm_gas",
                opts.av_z,
                &run_timestamp(),
            );
            let total = driver::find_snapshot_outputs(&sim_dir)?.len();
            let bar = progress_bar(total as u64, "compositing snapshots");
            let stats = driver::run_over_simulation(&sim_dir, nproc, |snap_path| {
                let number = output_number(snap_path).unwrap_or(0);
                let mut view = SnapView::new(view_params);
                view.load_snapshot(snap_path)?;
                let snap = view.snapshot_mut()?;
                let result = composite::make_gas_dm_image(
                    snap,
                    &opts,
                    channel_colors,
                    &out_dir.join(figure_name(number)),
                )
                .map(|_| ());
                bar.inc(1);
                result
            })?;
            bar.finish_with_message("done");
            info!(
                "{} composites in {}, {} failures",
                stats.processed,
                out_dir.display(),
                stats.failed
            );
            Ok(())
        }
        Command::Equilibrium {
            selector,
            render,
            profile,
            gravity,
            dehnen_dm,
            snapshot,
        } => {
            let mode: GravityModel = gravity.parse()?;
            let (sim_name, sim_dir) = selector.resolve()?;
            let mut popts = profile.profile_options(&render)?;
            // The solve is spherical by construction.
            popts.ndim = 3;
            popts.family = Some(Family::Gas);
            let temp_unit = match popts.units {
                Some(u) => u,
                None => Unit::from_str(&config().units.temperature)
                    .map_err(|e| ClusterError::Snapshot(e.to_string()))?,
            };
            popts.units = Some(temp_unit);

            let outputs = driver::find_snapshot_outputs(&sim_dir)?;
            let snap_path = select_output(&outputs, snapshot)?;
            let number = output_number(snap_path).unwrap_or(0);
            let mut view = SnapView::new(render.view_params());
            view.load_snapshot(snap_path)?;
            let snap = view.snapshot_mut()?;

            // Radial grid and enclosed-mass curves from the gas particles.
            let gas_r: Vec<f64> = snap
                .gas
                .pos
                .iter()
                .map(|p| (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt())
                .collect();
            let edges = bin_edges(&gas_r, popts.nbins, popts.spacing, popts.rmin, popts.rmax)
                .map_err(|e| ClusterError::Snapshot(e.to_string()))?;
            let centers = bin_centers(&edges, popts.spacing);
            let m_gas = enclosed_mass(&gas_r, &snap.gas.mass, &edges);
            let m_dm = match &dehnen_dm {
                Some(v) => {
                    let halo = DehnenProfile::new(v[0], v[1], v[2]);
                    info!(
                        "analytic halo: M = {:.3e} Msol, half-mass radius {:.0} kpc",
                        halo.m,
                        halo.half_mass_radius()
                    );
                    centers.iter().map(|&r| halo.enclosed_mass(r)).collect()
                }
                None => {
                    let dm_r: Vec<f64> = snap
                        .dm
                        .pos
                        .iter()
                        .map(|p| (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt())
                        .collect();
                    enclosed_mass(&dm_r, &snap.dm.mass, &edges)
                }
            };

            let predicted_values = equilibrium_temperature(
                &centers,
                &m_dm,
                &m_gas,
                &EquilibriumOptions {
                    mode,
                    interp: None,
                    subsample: 4,
                    unit: temp_unit,
                },
            )?;
            let measured = make_profile(snap, Quantity::Temp, &popts)?;
            let predicted = ProfileProduct {
                r: centers,
                values: predicted_values,
                unit: temp_unit,
                quantity: Quantity::Temp,
                time: measured.time,
                label: format!("equilibrium ({gravity})"),
            };

            // Consistency diagnostic: the hydrostatic mass implied by the
            // measured density and temperature at the outer edge.
            let mut kelvin_opts = popts.clone();
            kelvin_opts.units = Some(Unit::Kelvin);
            let temp_k = make_profile(snap, Quantity::Temp, &kelvin_opts)?;
            let mut rho_opts = popts.clone();
            rho_opts.units = None;
            let rho_prof = make_profile(snap, Quantity::Rho, &rho_opts)?;
            let m_hydro = hydrostatic_mass(
                &rho_prof.r,
                &rho_prof.values,
                &temp_k.values,
                config().numerics.mu,
                config().numerics.hydrostatic_bandwidth,
            );
            if let (Some(&r_out), Some(&m_out)) = (rho_prof.r.last(), m_hydro.last()) {
                info!("hydrostatic mass inside {r_out:.0} kpc: {m_out:.3e} Msol");
            }

            let out_dir = figure_dir(
                &config().paths.figures_root,
                &sim_name,
                "temp_equilibrium",
                false,
                &run_timestamp(),
            );
            make_profiles_plot(
                &[measured, predicted],
                None,
                true,
                &out_dir.join(figure_name(number)),
            )?;
            info!("equilibrium comparison written under {}", out_dir.display());
            Ok(())
        }
        Command::Movify {
            simulation_name,
            framerate,
        } => {
            let figures_root = &config().paths.figures_root;
            let movies_root = &config().paths.movies_root;
            let scan_root = match &simulation_name {
                Some(name) => figures_root.join(name),
                None => figures_root.clone(),
            };
            let leaves = movify::leaf_directories(&scan_root)
                .map_err(|e| ClusterError::PipelinePlot(format!("{e:#}")))?;
            let stats = movify::movify(&leaves, figures_root, movies_root, framerate)?;
            info!(
                "movify finished: {} movies, {} directories skipped",
                stats.encoded, stats.skipped
            );
            Ok(())
        }
        Command::ReplaceIcParam { ic, old, new } => {
            let log_path =
                cluster_common::IcLog::default_path(&config().paths.namelists_root);
            let mut log = cluster_common::IcLog::load(log_path)?;
            log.replace_param_file(&ic, &old, &new)?;
            info!("IC '{ic}': '{old}' replaced by '{new}'");
            Ok(())
        }
    }
}

/// Directory tag of a profile run: the joined quantity tags.
fn profile_tag(quantities: &[Quantity]) -> String {
    let tags: Vec<&str> = quantities.iter().map(|q| q.tag()).collect();
    format!("{}-profile", tags.join("_"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn selector_requires_one_of_name_or_directory() {
        let sel = SelectorArgs {
            simulation_name: None,
            simulation_directory: None,
        };
        assert!(matches!(sel.resolve(), Err(ClusterError::SimBackend(_))));
    }

    #[test]
    fn missing_directory_is_a_backend_error() {
        let sel = SelectorArgs {
            simulation_name: None,
            simulation_directory: Some(PathBuf::from("/definitely/not/here")),
        };
        assert!(matches!(sel.resolve(), Err(ClusterError::SimBackend(_))));
    }

    #[test]
    fn render_args_build_plot_options() {
        let cli = Cli::parse_from([
            "cluster-pipeline",
            "images",
            "--simulation_directory",
            "/tmp",
            "--quantity",
            "rho",
            "--width",
            "1500",
            "--resolution",
            "256",
            "--vbounds",
            "1e-30",
            "1e-24",
            "--families",
            "gas",
            "dm",
            "--integrate",
            "--logarithmic",
        ]);
        match cli.command {
            Command::Images { render, .. } => {
                let opts = render.plot_options().unwrap();
                assert_eq!(opts.resolution, 256);
                assert!(opts.av_z);
                assert_eq!(opts.log, Some(true));
                assert_eq!(opts.vmin, Some(1e-30));
                assert_eq!(
                    opts.families,
                    Some(vec![Family::Gas, Family::DarkMatter])
                );
            }
            other => panic!("parsed into {other:?}"),
        }
    }

    #[test]
    fn bad_quantity_tag_is_rejected() {
        assert!(parse_quantity_list(&["vorticity".to_string()]).is_err());
        assert!(parse_quantity_list(&[]).is_err());
    }

    #[test]
    fn profile_tag_joins_quantities() {
        assert_eq!(
            profile_tag(&[Quantity::Temp, Quantity::Entropy]),
            "temp_entropy-profile"
        );
    }
}
