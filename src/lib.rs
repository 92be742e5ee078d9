///
/// ## Design
///
/// * a scriptable keyboard/mouse: a script of HID reports lives in flash and
///   is replayed one record per timer tick
/// * one 16-byte record format for storage, the console's raw writes and
///   the engine; bytecode scripts are expanded into the same records
/// * flash is erase-then-program, every word read back after it's written
/// * the tick must never block for long and never allocate
/// * abstract the medium, the report sink and the console transport so the
///   core can run against real hardware or the host simulation here
///
/// Model
///
/// Device
///  |-- store(flash medium)        -- the script, erase/program/verify/read
///  `-- engine(cursor)             -- index, paused, single step, delay countdown
///
/// Console(typing buffer)          -- line protocol; drives the store and engine
///
/// Host
///  |-- device, console, report sink (the "computer" the reports go to)
///  |-- input (keystrokes or a pipe), monitor (TUI or plain stdout)
///  `-- main loop
///       |-- bytes = input.peek(); console.on_receive(bytes, device, monitor.transport())
///       |-- device.on_tick(sink)
///       |-- redraw monitor now and then
///       `-- sleep until the next tick deadline
///
/// The console and the tick both take the device by `&mut`, so a store
/// program can never be interrupted by a tick halfway through an erase.
pub mod bytecode;
pub mod config;
pub mod console;
pub mod device;
pub mod display;
pub mod engine;
pub mod error;
pub mod flash;
pub mod host;
pub mod input;
pub mod jiggler;
pub mod report;
pub mod sink;
pub mod store;
