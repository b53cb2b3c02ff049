//! Interactive shell over the serial console.
//!
//! Runs as an ordinary task. Every command goes through the kernel's public
//! operations; nothing here reaches into kernel state directly.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::hint::black_box;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::arch;
use crate::config::{HEAP_SIZE, RR_QUANTUM, TICK_HZ};
use crate::console::{self, LineBuffer};
use crate::kernel;
use crate::memory::heap;
use crate::sync::{Mutex, Semaphore};
use crate::task::scheduler::Policy;
use crate::task::{TaskError, TaskId, TaskInfo, TaskState};
use crate::trap;

/// Burst hint the shell task is created with.
pub const SHELL_BURST_HINT: u64 = 10;

/// Burst hints of the benchmark batch.
pub const BENCH_BURSTS: [u64; 6] = [10, 20, 15, 30, 25, 12];

const PC_BUFFER_SIZE: usize = 16;
const PC_ITEMS: usize = 10;

/// A parsed command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Empty,
    Help,
    Ps,
    RunCpu,
    RunIo,
    Kill(TaskId),
    Sched(Policy),
    Preempt(bool),
    Uptime,
    MemInfo,
    IntStats,
    Sleep(u64),
    PcDemo,
    Bench,
    /// Recognized command with bad arguments.
    Usage(&'static str),
    Unknown(&'a str),
}

impl<'a> Command<'a> {
    pub fn parse(line: &'a str) -> Self {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Command::Empty;
        };
        let args: Vec<&str> = words.collect();

        match (name, args.as_slice()) {
            ("help", []) => Command::Help,
            ("ps", []) => Command::Ps,
            ("run", ["cpu"]) => Command::RunCpu,
            ("run", ["io"]) => Command::RunIo,
            ("run", _) => Command::Usage("run cpu|io"),
            ("kill", [id]) => match id.parse() {
                Ok(id) => Command::Kill(TaskId::new(id)),
                Err(_) => Command::Usage("kill <id>"),
            },
            ("kill", _) => Command::Usage("kill <id>"),
            ("sched", ["rr"]) => Command::Sched(Policy::RoundRobin),
            ("sched", ["sjf"]) => Command::Sched(Policy::ShortestJobFirst),
            ("sched", ["preempt", "on"]) => Command::Preempt(true),
            ("sched", ["preempt", "off"]) => Command::Preempt(false),
            ("sched", ["preempt", ..]) => Command::Usage("sched preempt on|off"),
            ("sched", _) => Command::Usage("sched rr|sjf|preempt on|off"),
            ("uptime", []) => Command::Uptime,
            ("meminfo", []) => Command::MemInfo,
            ("intstats", []) => Command::IntStats,
            ("sleep", [ticks]) => match ticks.parse() {
                Ok(ticks) if ticks > 0 => Command::Sleep(ticks),
                _ => Command::Usage("sleep <ticks>"),
            },
            ("sleep", _) => Command::Usage("sleep <ticks>"),
            ("pcdemo", []) => Command::PcDemo,
            ("bench", []) => Command::Bench,
            _ => Command::Unknown(line),
        }
    }
}

/// Entry point of the shell task.
pub fn shell_task(_: usize) {
    let mut line = LineBuffer::new();
    loop {
        reap_finished();
        kernel::maybe_yield();

        print!("uros> ");
        let command = Command::parse(console::read_line(&mut line));
        execute(command);

        kernel::maybe_yield();
    }
}

/// Runs one command, printing its output.
pub fn execute(command: Command) {
    match command {
        Command::Empty => {}
        Command::Help => help(),
        Command::Ps => ps(),
        Command::RunCpu => report_created("CPU", kernel::create(cpu_task, 50, 20)),
        Command::RunIo => run_io(),
        Command::Kill(id) => kill(id),
        Command::Sched(policy) => {
            kernel::set_mode(policy);
            match policy {
                Policy::RoundRobin => {
                    println!("Scheduler: round-robin (quantum {} ticks)", RR_QUANTUM)
                }
                Policy::ShortestJobFirst => {
                    println!("Scheduler: shortest job first (non-preemptive)")
                }
            }
        }
        Command::Preempt(on) => {
            kernel::set_preempt(on);
            println!("Preemption: {}", if on { "on" } else { "off" });
        }
        Command::Uptime => uptime(),
        Command::MemInfo => meminfo(),
        Command::IntStats => intstats(),
        Command::Sleep(ticks) => {
            println!("Sleeping for {} ticks...", ticks);
            kernel::sleep(ticks);
            println!("Done sleeping");
        }
        Command::PcDemo => pcdemo(),
        Command::Bench => bench(),
        Command::Usage(usage) => println!("Usage: {}", usage),
        Command::Unknown(line) => {
            println!("Unknown command: {}", line);
            println!("Type 'help' for available commands");
        }
    }
}

fn help() {
    println!("Available commands:");
    println!("  help                  - Show this help");
    println!("  ps                    - List tasks");
    println!("  run cpu               - Create a CPU-bound task");
    println!("  run io                - Create an I/O-bound task");
    println!("  kill <id>             - Kill and reap a task");
    println!("  sched rr|sjf          - Select the scheduling policy");
    println!("  sched preempt on|off  - Enable/disable preemption");
    println!("  sleep <ticks>         - Sleep for N ticks");
    println!("  pcdemo                - Producer/consumer demo");
    println!("  bench                 - Compare RR and SJF");
    println!("  uptime                - Show system uptime");
    println!("  meminfo               - Show stack arena usage");
    println!("  intstats              - Show interrupt/timer status");
}

fn ps() {
    let current = kernel::current();
    println!("ID   STATE     TICKS  BURST_EST  ARRIVAL  WAIT");
    for task in kernel::snapshot() {
        let marker = if Some(task.id) == current { '*' } else { ' ' };
        println!(
            "{:<3}{} {:<9} {:<6} {:<10} {:<8} {}",
            task.id.index(),
            marker,
            task.state,
            task.metrics.ticks_used,
            task.metrics.burst_estimate,
            task.metrics.arrival_time,
            task.metrics.wait_time
        );
    }
    println!("policy {}, preemption {}", kernel::mode(), on_off(kernel::preempt()));
}

fn report_created(kind: &str, result: Result<TaskId, TaskError>) {
    match result {
        Ok(id) => println!("Created {} task {}", kind, id.index()),
        Err(e) => println!("Failed to create {} task: {}", kind, e),
    }
}

fn run_io() {
    static NEXT_IO: AtomicUsize = AtomicUsize::new(0);
    let n = NEXT_IO.fetch_add(1, Ordering::Relaxed);
    report_created("I/O", kernel::create(io_task, n, 15));
}

fn kill(id: TaskId) {
    match kernel::kill(id) {
        Ok(()) => {
            kernel::reap(id);
            println!("Killed task {}", id.index());
        }
        Err(e) => println!("Cannot kill task {}: {}", id.index(), e),
    }
}

fn uptime() {
    let ticks = kernel::ticks();
    println!(
        "Uptime: {}.{:02} seconds ({} ticks)",
        ticks / TICK_HZ,
        ticks % TICK_HZ,
        ticks
    );
}

fn meminfo() {
    let stats = kernel::memory_stats();
    let percent = |bytes: usize| bytes * 100 / HEAP_SIZE;
    println!("=== Stack arena ===");
    println!("Total:         {} bytes", stats.capacity);
    println!("Used:          {} bytes ({}%)", stats.allocated, percent(stats.allocated));
    println!("Free:          {} bytes ({}%)", stats.free, percent(stats.free));
    println!("Blocks:        {} ({} free)", stats.blocks, stats.free_blocks);
    println!(
        "Fragmentation: {}",
        if stats.free_blocks > 3 { "moderate" } else { "low" }
    );
    println!("=== Kernel heap ===");
    println!("Used:          {} of {} bytes", heap::heap_used(), heap::heap_size());
}

fn intstats() {
    let (sstatus, sie, sip) = arch::interrupt_registers();
    println!(
        "ticks={}  interrupts={}  sstatus={:#x}  sie={:#x}  sip={:#x}",
        kernel::ticks(),
        trap::interrupt_count(),
        sstatus,
        sie,
        sip
    );
    println!("preempt={}", on_off(kernel::preempt()));
}

fn on_off(on: bool) -> &'static str {
    if on {
        "on"
    } else {
        "off"
    }
}

/// Reclaims every finished task.
fn reap_finished() {
    for task in kernel::snapshot() {
        if task.state == TaskState::Zombie && kernel::reap(task.id) {
            log::debug!(target: "task", "shell reaped {}", task.id);
        }
    }
}

/// Spins for roughly `rounds` additions.
fn burn(rounds: u32) {
    let mut sum = 0u32;
    for i in 0..rounds {
        sum = black_box(sum.wrapping_add(i));
    }
    black_box(sum);
}

fn cpu_task(iterations: usize) {
    for i in 0..iterations {
        burn(10_000);
        kernel::maybe_yield();
        if i % 5 == 0 {
            kernel::yield_now();
        }
    }
}

fn io_task(n: usize) {
    for i in 0..5 {
        println!("I/O task {}: iteration {}", n, i);
        // Stands in for waiting on a device.
        kernel::sleep(5);
    }
}

fn bench_task(burst: usize) {
    let start = kernel::ticks();
    while kernel::ticks() - start < burst as u64 {
        burn(1_000);
        kernel::maybe_yield();
    }
}

/// Bounded buffer shared by the producer/consumer demo.
struct Ring {
    items: [usize; PC_BUFFER_SIZE],
    head: usize,
    tail: usize,
}

struct PcShared {
    empty: Semaphore,
    full: Semaphore,
    ring: Mutex<Ring>,
}

fn pcdemo() {
    println!("=== Producer/consumer demo ===");
    println!("Buffer size: {} items, {} items to move", PC_BUFFER_SIZE, PC_ITEMS);

    let shared = Arc::new(PcShared {
        empty: Semaphore::new(PC_BUFFER_SIZE),
        full: Semaphore::new(0),
        ring: Mutex::new(Ring {
            items: [0; PC_BUFFER_SIZE],
            head: 0,
            tail: 0,
        }),
    });

    let producer = Arc::clone(&shared);
    match kernel::spawn(move || produce(&producer), 20) {
        Ok(id) => println!("Producer task {}", id.index()),
        Err(e) => {
            println!("Failed to create producer: {}", e);
            return;
        }
    }
    match kernel::spawn(move || consume(&shared), 20) {
        Ok(id) => println!("Consumer task {}", id.index()),
        Err(e) => println!("Failed to create consumer: {}", e),
    }
}

fn produce(shared: &PcShared) {
    for item in 1..=PC_ITEMS {
        shared.empty.wait();
        {
            let mut ring = shared.ring.lock();
            let at = ring.head;
            ring.items[at] = item;
            ring.head = (at + 1) % PC_BUFFER_SIZE;
            println!("Producer: item {} at {}", item, at);
        }
        shared.full.post();
        kernel::sleep(5);
    }
    println!("Producer: done");
}

fn consume(shared: &PcShared) {
    for _ in 0..PC_ITEMS {
        shared.full.wait();
        {
            let mut ring = shared.ring.lock();
            let at = ring.tail;
            println!("Consumer: item {} from {}", ring.items[at], at);
            ring.tail = (at + 1) % PC_BUFFER_SIZE;
        }
        shared.empty.post();
        kernel::sleep(5);
    }
    println!("Consumer: done");
}

/// Averages of one benchmark round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BenchResult {
    pub avg_wait: u64,
    pub avg_turnaround: u64,
    pub duration: u64,
    /// Tasks per second, scaled by 100.
    pub throughput_centi: u64,
}

impl BenchResult {
    /// Summarizes finished tasks observed over `duration` ticks.
    pub fn from_tasks(tasks: &[TaskInfo], duration: u64) -> Self {
        let n = tasks.len().max(1) as u64;
        let wait: u64 = tasks.iter().map(|t| t.metrics.wait_time).sum();
        let turnaround: u64 = tasks.iter().filter_map(|t| t.metrics.turnaround()).sum();
        BenchResult {
            avg_wait: wait / n,
            avg_turnaround: turnaround / n,
            duration,
            throughput_centi: tasks.len() as u64 * 100 * TICK_HZ / duration.max(1),
        }
    }
}

fn bench() {
    println!("Running benchmark...");
    let previous = kernel::mode();

    let rr = bench_round(Policy::RoundRobin);
    let sjf = bench_round(Policy::ShortestJobFirst);
    kernel::set_mode(previous);

    let (Some(rr), Some(sjf)) = (rr, sjf) else {
        return;
    };
    println!();
    println!("Benchmark results ({} tasks):", BENCH_BURSTS.len());
    println!("                  RR        SJF");
    println!("Wait (avg):       {:<9} {} ticks", rr.avg_wait, sjf.avg_wait);
    println!(
        "Turnaround (avg): {:<9} {} ticks",
        rr.avg_turnaround, sjf.avg_turnaround
    );
    println!(
        "Throughput:       {}.{:02}      {}.{:02} tasks/sec",
        rr.throughput_centi / 100,
        rr.throughput_centi % 100,
        sjf.throughput_centi / 100,
        sjf.throughput_centi % 100
    );
}

fn bench_round(policy: Policy) -> Option<BenchResult> {
    println!("Round: {}...", policy);
    kernel::set_mode(policy);

    let start = kernel::ticks();
    let mut ids = Vec::with_capacity(BENCH_BURSTS.len());
    for &burst in &BENCH_BURSTS {
        match kernel::create(bench_task, burst as usize, burst) {
            Ok(id) => ids.push(id),
            Err(e) => {
                println!("Failed to create benchmark task: {}", e);
                for &id in &ids {
                    let _ = kernel::kill(id);
                    kernel::reap(id);
                }
                return None;
            }
        }
    }

    // Sleep rather than yield so the shell does not compete with the batch.
    while !ids
        .iter()
        .all(|&id| kernel::lookup(id).is_some_and(|t| t.state == TaskState::Zombie))
    {
        kernel::sleep(1);
    }
    let duration = kernel::ticks() - start;

    let finished: Vec<TaskInfo> = ids.iter().filter_map(|&id| kernel::lookup(id)).collect();
    for &id in &ids {
        kernel::reap(id);
    }

    println!("{} done in {} ticks", policy, duration);
    Some(BenchResult::from_tasks(&finished, duration))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskMetrics;

    #[test]
    fn parses_commands() {
        assert_eq!(Command::parse(""), Command::Empty);
        assert_eq!(Command::parse("   "), Command::Empty);
        assert_eq!(Command::parse("ps"), Command::Ps);
        assert_eq!(Command::parse("run  cpu"), Command::RunCpu);
        assert_eq!(Command::parse("run io"), Command::RunIo);
        assert_eq!(Command::parse("kill 7"), Command::Kill(TaskId::new(7)));
        assert_eq!(
            Command::parse("sched sjf"),
            Command::Sched(Policy::ShortestJobFirst)
        );
        assert_eq!(Command::parse("sched preempt on"), Command::Preempt(true));
        assert_eq!(Command::parse("sched preempt off"), Command::Preempt(false));
        assert_eq!(Command::parse("sleep 30"), Command::Sleep(30));
        assert_eq!(Command::parse("bench"), Command::Bench);
        assert_eq!(Command::parse("pcdemo"), Command::PcDemo);
    }

    #[test]
    fn bad_arguments_print_usage() {
        assert_eq!(Command::parse("kill x"), Command::Usage("kill <id>"));
        assert_eq!(Command::parse("kill"), Command::Usage("kill <id>"));
        assert_eq!(Command::parse("sleep 0"), Command::Usage("sleep <ticks>"));
        assert_eq!(Command::parse("sleep -3"), Command::Usage("sleep <ticks>"));
        assert_eq!(
            Command::parse("sched preempt maybe"),
            Command::Usage("sched preempt on|off")
        );
        assert_eq!(Command::parse("run gpu"), Command::Usage("run cpu|io"));
    }

    #[test]
    fn unknown_commands_echo_the_line() {
        assert_eq!(Command::parse("reboot now"), Command::Unknown("reboot now"));
        assert_eq!(Command::parse("ps -a"), Command::Unknown("ps -a"));
    }

    fn finished(wait: u64, arrival: u64, finish: u64) -> TaskInfo {
        TaskInfo {
            id: TaskId::new(1),
            state: TaskState::Zombie,
            argument: 0,
            stack_size: 0,
            metrics: TaskMetrics {
                ticks_used: 0,
                burst_hint: 0,
                burst_estimate: 0,
                arrival_time: arrival,
                start_time: Some(arrival + wait),
                finish_time: Some(finish),
                wait_time: wait,
            },
        }
    }

    #[test]
    fn bench_result_averages() {
        let tasks = [finished(0, 0, 10), finished(10, 0, 22), finished(22, 0, 37)];
        let result = BenchResult::from_tasks(&tasks, 40);
        assert_eq!(result.avg_wait, 10);
        assert_eq!(result.avg_turnaround, 23);
        // 3 tasks in 0.4 s.
        assert_eq!(result.throughput_centi, 750);
    }
}
