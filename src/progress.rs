//! Per-bucket counters for a scan run and the final report rendering.

use std::time::Instant;

pub struct Status {
    name: &'static str,
    count: usize,
}

impl Status {
    fn new(name: &'static str) -> Self {
        Self { name, count: 0 }
    }

    /// Print the classification line for one file and count it.
    pub fn print(&mut self, message: &str) {
        println!("{message}");
        self.count += 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    fn report(&self, total: usize) -> String {
        let percentage = if total == 0 {
            0.0
        } else {
            self.count as f64 / total as f64 * 100.0
        };

        format!("*\t{}: {} ({percentage:.0}%)", self.name, self.count)
    }
}

pub struct Progress {
    start_time: Instant,
    pub total: usize,
    pub generated: Status,
    pub already_exists: Status,
    pub not_found: Status,
    pub error: Status,
    pub skipped: Status,
}

impl Progress {
    pub fn new(total: usize) -> Self {
        Self {
            start_time: Instant::now(),
            total,
            generated: Status::new("Generated for cross-seeding"),
            already_exists: Status::new("Already exists"),
            not_found: Status::new("Not found"),
            error: Status::new("Errors"),
            skipped: Status::new("Skipped"),
        }
    }

    pub fn report(&self) -> String {
        let divider = format!("\n{}", "-".repeat(50));
        let time_taken = self.start_time.elapsed().as_secs_f64();
        let torrent_plural = if self.total == 1 { "torrent" } else { "torrents" };
        let messages = [
            &self.generated,
            &self.already_exists,
            &self.not_found,
            &self.error,
            &self.skipped,
        ]
        .iter()
        .map(|status| status.report(self.total))
        .collect::<Vec<_>>()
        .join("\n");

        format!(
            "{divider}\nAnalyzed {} local {torrent_plural} in {time_taken:.2} seconds:\n{messages}{divider}",
            self.total
        )
    }
}
