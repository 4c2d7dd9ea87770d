use anyhow::{anyhow, Context};
use config::{Config, File};
use hypertile::{
    geometry::{Extension, GeometryHandle},
    graph::{
        self, BinaryTilingGraph, NilLattice, ProductGraph, TilingPatch,
    },
    raycast::{
        settings_for, OpenSpace, RaycastShaderBuilder, Raycaster, WallLayout,
        DEFAULT_MATRIX_CAPACITY,
    },
    timed, CellGraph, GeometryConfig, GeometryContext, GeometryFamily,
    Transform, TransformResolver,
};
use log::{info, warn, LevelFilter};
use simple_logger::SimpleLogger;
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    process,
    str::FromStr,
};
use structopt::StructOpt;
use strum::{Display, EnumString};

/// CLI for inspecting the constants, transforms and raycaster of a
/// tessellated geometry.
#[derive(Debug, StructOpt)]
#[structopt(name = "hypertile")]
struct Opt {
    /// Path to a config file that defines the geometry. Supported formats:
    /// JSON, TOML. If not given, the default geometry is used.
    #[structopt(short, long)]
    config: Option<PathBuf>,

    /// The logging level to use. See
    /// https://docs.rs/log/0.4.11/log/enum.LevelFilter.html for options
    #[structopt(long, default_value = "info")]
    log_level: LevelFilter,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Print the derived parameters of the geometry
    Params {
        /// Output format. Supported formats:
        ///
        /// json - The derived constants, height levels and extension tables
        ///
        /// cfg - The full config, with every default filled in, as TOML
        #[structopt(short, long, default_value = "json")]
        format: ParamsFormat,
    },

    /// Generate the raycaster program for the geometry
    Shader {
        /// Directory to write `raycast.vert` and `raycast.frag` to. If not
        /// given, the fragment program is printed.
        #[structopt(short, long)]
        output: Option<PathBuf>,
    },

    /// Build a raycast map around the root cell
    Map {
        /// How many steps out from the root tiling patches extend
        #[structopt(long, default_value = "4")]
        radius: usize,

        /// Print the encoded connection texels too
        #[structopt(long)]
        texels: bool,
    },

    /// Print the transform carrying one cell's frame into another's. Cells
    /// are given as comma-separated paths of directions from the root, e.g.
    /// `0,2,1`. An empty path is the root itself.
    Resolve {
        #[structopt(long, default_value = "")]
        from: DirectionPath,

        #[structopt(long)]
        to: DirectionPath,

        /// How many steps out from the root tiling patches extend
        #[structopt(long, default_value = "4")]
        radius: usize,
    },
}

#[derive(Copy, Clone, Debug, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
enum ParamsFormat {
    Json,
    Cfg,
}

/// A path of directions through the cell graph
#[derive(Clone, Debug, Default)]
struct DirectionPath(Vec<usize>);

impl FromStr for DirectionPath {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(',')
            .map(str::trim)
            .filter(|step| !step.is_empty())
            .map(|step| {
                step.parse()
                    .with_context(|| format!("invalid direction {:?}", step))
            })
            .collect::<anyhow::Result<_>>()
            .map(Self)
    }
}

/// The cell graphs the CLI knows how to build
enum Graph {
    Patch(TilingPatch),
    Product(ProductGraph<TilingPatch>),
    Nil(NilLattice),
    Binary(BinaryTilingGraph),
}

/// Evaluate an expression with the concrete graph bound to `$g`
macro_rules! with_graph {
    ($graph:expr, $g:ident => $body:expr) => {
        match $graph {
            Graph::Patch($g) => $body,
            Graph::Product($g) => $body,
            Graph::Nil($g) => $body,
            Graph::Binary($g) => $body,
        }
    };
}

impl Graph {
    fn new(params: &GeometryHandle, radius: usize) -> anyhow::Result<Self> {
        let graph = match (params.family, &params.extension) {
            (GeometryFamily::Nil, Extension::Lattice(lattice)) => {
                Self::Nil(NilLattice::new(lattice.width))
            }
            (GeometryFamily::BinaryTiling, Extension::BinaryTiling(tables)) => {
                Self::Binary(BinaryTilingGraph::new(tables.width))
            }
            (GeometryFamily::Product(_), _) => {
                let underlying = params.underlying.as_ref().ok_or_else(|| {
                    anyhow!("product geometry without an underlying geometry")
                })?;
                let base = TilingPatch::new(underlying, radius)?;
                Self::Product(ProductGraph::new(base))
            }
            _ => Self::Patch(TilingPatch::new(params, radius)?),
        };
        Ok(graph)
    }
}

fn load_config(config_path: &Path) -> anyhow::Result<GeometryConfig> {
    let mut settings = Config::new();
    let config_path = config_path.to_str().ok_or_else(|| {
        anyhow!("invalid character in path {:?}", config_path)
    })?;
    settings
        .merge(File::with_name(config_path))
        .context("error reading config file")?;
    settings.try_into().context("error reading config")
}

fn print_params(
    config: &GeometryConfig,
    params: &GeometryHandle,
    format: ParamsFormat,
) -> anyhow::Result<()> {
    let output = match format {
        ParamsFormat::Json => params.to_json(),
        ParamsFormat::Cfg => {
            // Going through a value puts plain keys ahead of tables
            let value = toml::Value::try_from(config)
                .context("error serializing config")?;
            toml::to_string_pretty(&value)
                .context("error serializing config")?
        }
    };
    println!("{}", output);
    Ok(())
}

fn write_file(path: &Path, contents: &str) -> anyhow::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .with_context(|| format!("error opening output file {:?}", path))?;
    file.write_all(contents.as_bytes())
        .with_context(|| format!("error writing to file {:?}", path))
}

fn gen_shader(
    config: &GeometryConfig,
    params: &GeometryHandle,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let settings = settings_for(&config.raycast, params);
    let layout = WallLayout::new(params, settings.reflect_val > 0.0)?;
    let capacity = DEFAULT_MATRIX_CAPACITY.max(layout.matrices().len());
    let builder =
        RaycastShaderBuilder::new(params, &layout, &settings, capacity);
    let program = builder.build()?;

    match output {
        Some(output_dir) => {
            fs::create_dir_all(output_dir)?;
            timed!("Writing raycaster program", log::Level::Info, {
                write_file(&output_dir.join("raycast.vert"), &program.vertex)?;
                write_file(
                    &output_dir.join("raycast.frag"),
                    &program.fragment,
                )?;
            });
            for (name, value) in builder.uniform_values() {
                info!("uniform {} = {}", name, value);
            }
        }
        None => println!("{}", program.fragment),
    }
    Ok(())
}

fn build_map<G: CellGraph>(
    config: &GeometryConfig,
    params: &GeometryHandle,
    graph: &G,
    texels: bool,
) -> anyhow::Result<()> {
    let resolver = TransformResolver::new(params, graph);
    let mut raycaster = Raycaster::new(config.raycast, params);
    let frame = raycaster
        .prepare(&resolver, &OpenSpace, graph.root())
        .context("error building raycast map")?;
    info!(
        "Map has {} cells, program holds {} matrices",
        frame.map.len(),
        raycaster.capacity()
    );

    println!("{}", serde_json::to_string_pretty(&frame.map.summary())?);
    if texels {
        let map = &frame.map;
        for id in 0..map.len() {
            let row: Vec<String> = (0..map.degree())
                .map(|side| map.connections()[map.texel_index(id, side)])
                .map(|texel| format!("{:?}", texel))
                .collect();
            println!("{}: {}", id, row.join(" "));
        }
    }
    Ok(())
}

fn resolve<G: CellGraph>(
    params: &GeometryHandle,
    graph: &G,
    from: &DirectionPath,
    to: &DirectionPath,
) -> anyhow::Result<Transform> {
    let root = graph.root();
    let c1 = graph::walk(graph, root, &from.0)
        .ok_or_else(|| anyhow!("path {:?} leaves the graph", from.0))?;
    let c2 = graph::walk(graph, root, &to.0)
        .ok_or_else(|| anyhow!("path {:?} leaves the graph", to.0))?;
    info!("Resolving {:?} relative to {:?}", c2, c1);
    let resolver = TransformResolver::new(params, graph);
    Ok(resolver.relative_matrix(c2, c1, &params.family.origin()))
}

/// Run the CLI with some options
fn run(opt: Opt) -> anyhow::Result<()> {
    SimpleLogger::new().with_level(opt.log_level).init()?;

    let config = match &opt.config {
        Some(config_path) => load_config(config_path)?,
        None => GeometryConfig::default(),
    };
    let mut context = GeometryContext::default();
    let params = timed!("Parameter derivation", log::Level::Info, {
        context.set_current(&config)?
    });
    if let Some(reason) = &params.invalid {
        warn!("Height mapping is degenerate ({}), using fallbacks", reason);
    }

    match opt.command {
        Command::Params { format } => print_params(&config, &params, format),
        Command::Shader { output } => {
            gen_shader(&config, &params, output.as_deref())
        }
        Command::Map { radius, texels } => {
            let graph = Graph::new(&params, radius)?;
            with_graph!(&graph, g => build_map(&config, &params, g, texels))
        }
        Command::Resolve { from, to, radius } => {
            let graph = Graph::new(&params, radius)?;
            let m = with_graph!(&graph, g => resolve(&params, g, &from, &to))?;
            for row in m.row_iter() {
                let row: Vec<String> =
                    row.iter().map(|v| format!("{:>10.6}", v)).collect();
                println!("{}", row.join(" "));
            }
            Ok(())
        }
    }
}

fn main() {
    let exit_code = match run(Opt::from_args()) {
        Ok(_) => 0,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            1
        }
    };
    process::exit(exit_code);
}
