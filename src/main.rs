use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use livedis::adapter::{AdapterHandle, Backend};
use livedis::address::LiveAddress;
use livedis::config::Config;
use livedis::disasm::decoder::{listing, Decoder};
use livedis::disasm::render::Renderer;
use livedis::disasm::Arch;
use livedis::error::Error;
use livedis::image::{ObjectImage, StaticImage};
use livedis::launch::connect::Connector;
use livedis::launch::port::find_free_port;
use livedis::launch::Launcher;
use livedis::nav::state::NavState;
use livedis::nav::{MemoryPane, NavigationController, SymbolicView};
use livedis::session::registry::SessionRegistry;
use livedis::session::{DebugSession, DebugState, ImageMapping};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file, `~/.config/livedis/config.toml` by default
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a program under a debug server and show code at the program counter
    Launch {
        target: PathBuf,
        /// Show code at this address instead of the program counter
        #[clap(long, value_parser = parse_address)]
        at: Option<u64>,
        /// Number of instructions in a raw listing
        #[clap(long)]
        count: Option<usize>,
    },
    /// Attach to an already running debug stub
    Connect {
        /// Stub address in `host:port` form
        address: String,
        #[clap(long)]
        backend: Option<Backend>,
        /// Executable loaded by the debugee
        #[clap(long)]
        image: Option<PathBuf>,
        #[clap(long, value_parser = parse_address)]
        at: Option<u64>,
    },
    /// Disassemble hex encoded bytes
    Disasm {
        bytes: String,
        #[clap(long, value_parser = parse_address, default_value = "0")]
        addr: u64,
        #[clap(long)]
        arch: Option<Arch>,
    },
    /// Print first free port of the configured debug server range
    Ports,
}

fn parse_address(s: &str) -> Result<u64, String> {
    LiveAddress::from_str(s)
        .map(u64::from)
        .map_err(|e| e.to_string())
}

/// Prints positions instead of showing the symbolic view.
#[derive(Default)]
struct ConsoleSymbolicView {
    offset: u64,
}

impl SymbolicView for ConsoleSymbolicView {
    fn navigate(&mut self, addr: u64) -> bool {
        self.offset = addr;
        true
    }

    fn current_offset(&self) -> u64 {
        self.offset
    }
}

#[derive(Default)]
struct ConsoleMemoryPane {
    offset: u64,
}

impl MemoryPane for ConsoleMemoryPane {
    fn navigate(&mut self, addr: u64) {
        self.offset = addr;
    }

    fn current_offset(&self) -> u64 {
        self.offset
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = Config::load(args.config.as_deref());

    match args.command {
        Command::Launch { target, at, count } => {
            let count = count.unwrap_or(config.disasm.instruction_count);
            launch(&config, &target, at, count)
        }
        Command::Connect {
            address,
            backend,
            image,
            at,
        } => connect(&config, &address, backend, image.as_deref(), at),
        Command::Disasm { bytes, addr, arch } => {
            let data = hex::decode(bytes.trim()).context("decode hex bytes")?;
            let decoder = Decoder::new(arch.unwrap_or(config.disasm.arch), config.disasm.syntax)?;
            println!("{}", listing(&decoder.decode_block(&data, addr)));
            Ok(())
        }
        Command::Ports => {
            let (start, size) = (
                config.launch.port_range_start,
                config.launch.port_range_size,
            );
            let port = find_free_port(start, size).ok_or(Error::PortExhausted { start, size })?;
            println!("{port}");
            Ok(())
        }
    }
}

fn launch(config: &Config, target: &Path, at: Option<u64>, count: usize) -> anyhow::Result<()> {
    let image = ObjectImage::load(target)
        .with_context(|| format!("load image {}", target.display()))?;
    let mapping = ImageMapping::for_image(target, &image)?;
    let handle = Launcher::new(config)
        .launch(target)
        .with_context(|| format!("launch {}", target.display()))?;

    let session = DebugSession::new().with_image(mapping);
    explore(config, session, handle, image, at, count)
}

fn connect(
    config: &Config,
    address: &str,
    backend: Option<Backend>,
    image: Option<&Path>,
    at: Option<u64>,
) -> anyhow::Result<()> {
    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("expect `host:port`, got `{address}`"))?;
    let port: u16 = port.parse().context("parse port")?;

    let backend = match backend.or(config.launch.backend) {
        Some(backend) => backend,
        None => Launcher::new(config).backend()?,
    };
    let handle = Connector::new(backend, config.disasm.arch)
        .with_retry(config.launch.connect_attempts, config.connect_backoff())
        .connect(host, port)?;

    let (session, image) = match image {
        Some(path) => {
            let image = ObjectImage::load(path)?;
            let mapping = ImageMapping::for_image(path, &image)?;
            (DebugSession::new().with_image(mapping), image)
        }
        None => (
            DebugSession::new(),
            ObjectImage::new(PathBuf::new(), 0, 0, vec![], vec![]),
        ),
    };
    explore(
        config,
        session,
        handle,
        image,
        at,
        config.disasm.instruction_count,
    )
}

/// Attach session, show module map and code at `at` (program counter by default).
fn explore(
    config: &Config,
    session: DebugSession,
    handle: AdapterHandle,
    image: ObjectImage,
    at: Option<u64>,
    count: usize,
) -> anyhow::Result<()> {
    let session = Arc::new(Mutex::new(session));
    let id = SessionRegistry::global().register(session.clone());
    let mut session = session.lock().unwrap_or_else(PoisonError::into_inner);
    session.attach(handle)?;

    println!("session {id}");
    for module in session.module_map().iter() {
        println!("{} - {} {}", module.base, module.end, module.name);
    }

    let decoder = Decoder::new(config.disasm.arch, config.disasm.syntax)?;
    let renderer = Renderer::new(decoder).with_sign_bit_fixup(config.disasm.sign_bit_fixup);
    let image_base = image.base();
    let mut nav = NavigationController::new(
        Box::new(image),
        renderer,
        Box::new(ConsoleSymbolicView::default()),
        Box::new(ConsoleMemoryPane::default()),
    )
    .with_instruction_count(count);

    let addr = match at {
        Some(addr) => addr,
        None => session
            .ip()
            .ok_or_else(|| anyhow!("program counter is not available"))?,
    };
    nav.navigate(&mut *session, addr);

    match nav.nav_state() {
        NavState::Symbolicated(ctx) => {
            let function = ctx.function.as_ref().map(|f| f.name.as_str());
            println!(
                "{:#x} is backed by the image (base {image_base:#x}): {:#x} in {}",
                addr,
                ctx.address,
                function.unwrap_or("??")
            );
        }
        NavState::Raw { .. } => {
            for line in nav.raw_lines() {
                println!("{}", line.text());
            }
        }
    }

    session.disconnect();
    drop(session);
    SessionRegistry::global().remove(id);
    Ok(())
}
