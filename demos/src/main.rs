//! A minimal two-participant explicit serial coupling run, both sides
//! in-process over a [`coupling_runtime::message::LoopbackCommunicator`]
//! pair. Demonstrates the `initialize -> advance* -> finalize` lifecycle a
//! real embedding solver drives through [`coupling_runtime::SessionFacade`].

use clap::Parser;
use coupling_runtime::m2n::M2N;
use coupling_runtime::mapping::MappingDispatcher;
use coupling_runtime::mesh::DataKind;
use coupling_runtime::message::LoopbackCommunicator;
use coupling_runtime::scheme::{CouplingScheme, SerialCouplingScheme, SerialRole, SharedState, TimeWindowSize};
use coupling_runtime::SessionFacade;

#[derive(Debug, Parser)]
#[command(version, about = "Runs a two-participant explicit serial coupling demo in-process")]
struct Opts {
    /// Size of each fixed time window.
    #[arg(long, default_value_t = 1.0)]
    time_window_size: f64,

    /// How many windows to run before finalizing.
    #[arg(long, default_value_t = 5)]
    time_windows: u64,
}

fn main() {
    tracing_subscriber::fmt::init();

    let opts = Opts::parse();
    let max_time = opts.time_window_size * opts.time_windows as f64;
    let (first_leg, second_leg) = LoopbackCommunicator::pair();

    let first_thread = std::thread::spawn({
        let time_window_size = opts.time_window_size;
        move || run_first(first_leg, time_window_size, max_time, opts.time_windows)
    });
    run_second(second_leg, opts.time_window_size, max_time, opts.time_windows);
    first_thread.join().expect("first participant panicked");
}

fn run_first(leg: LoopbackCommunicator, time_window_size: f64, max_time: f64, max_time_windows: u64) {
    let scheme = CouplingScheme::Serial(SerialCouplingScheme::new(SerialRole::First, M2N::new(leg)));
    let shared = SharedState::new(TimeWindowSize::Fixed(time_window_size), max_time, max_time_windows, 1);
    let mut session = SessionFacade::new(
        vec!["interface".into()],
        scheme,
        shared,
        MappingDispatcher::new(),
        MappingDispatcher::new(),
    );

    let mesh_id = session.mesh_id("interface").unwrap();
    session.set_mesh_vertex(mesh_id, [0.0, 0.0, 0.0]).expect("add interface vertex");
    session.register_data(mesh_id, "temperature", DataKind::Scalar).expect("register data");
    session.register_send_data(mesh_id, "temperature", 0).expect("register send data");

    let mut dt = session.initialize().expect("initialize");
    let mut step = 0u32;
    while session.is_coupling_ongoing() {
        step += 1;
        session.write_scalar_data(mesh_id, "temperature", 0, 300.0 + step as f64).expect("write");
        dt = session.advance(dt).expect("advance");
        tracing::info!(step, "first participant advanced");
    }
    session.finalize().expect("finalize");
}

fn run_second(leg: LoopbackCommunicator, time_window_size: f64, max_time: f64, max_time_windows: u64) {
    let scheme = CouplingScheme::Serial(SerialCouplingScheme::new(SerialRole::Second, M2N::new(leg)));
    let shared = SharedState::new(TimeWindowSize::Fixed(time_window_size), max_time, max_time_windows, 1);
    let mut session = SessionFacade::new(
        vec!["interface".into()],
        scheme,
        shared,
        MappingDispatcher::new(),
        MappingDispatcher::new(),
    );

    let mesh_id = session.mesh_id("interface").unwrap();
    session.set_mesh_vertex(mesh_id, [0.0, 0.0, 0.0]).expect("add interface vertex");
    session.register_data(mesh_id, "temperature", DataKind::Scalar).expect("register data");
    session.register_receive_data(mesh_id, "temperature", 0).expect("register receive data");

    let mut dt = session.initialize().expect("initialize");
    while session.is_coupling_ongoing() {
        dt = session.advance(dt).expect("advance");
        if session.is_read_data_available() {
            let received = session.read_scalar_data(mesh_id, "temperature", 0).expect("read");
            tracing::info!(received, "second participant received boundary temperature");
        }
    }
    session.finalize().expect("finalize");
}
