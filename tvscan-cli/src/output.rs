//! Result printing.

use colored::Colorize;
use tvscan::assembly::StoreBatch;
use tvscan::database::{ChannelRecord, ScanHistoryRecord};
use tvscan_protocol::{ServiceType, SourceKind};

fn type_label(service_type: ServiceType) -> String {
    match service_type {
        ServiceType::Tv => "TV".green().to_string(),
        ServiceType::Radio => "Radio".cyan().to_string(),
        ServiceType::Atv => "ATV".yellow().to_string(),
        ServiceType::Unknown => "-".dimmed().to_string(),
        ServiceType::Other(raw) => format!("0x{:02X}", raw).dimmed().to_string(),
    }
}

fn source_label(source: SourceKind) -> &'static str {
    match source {
        SourceKind::Analog => "ATV",
        SourceKind::Cable => "DVB-C",
        SourceKind::Terrestrial => "DVB-T",
        SourceKind::Satellite => "DVB-S",
        SourceKind::Atsc => "ATSC",
    }
}

fn truncate(name: &str, width: usize) -> String {
    name.chars().take(width).collect()
}

pub fn print_channels_table(channels: &[ChannelRecord]) {
    if channels.is_empty() {
        println!("No channels found.");
        return;
    }

    println!(
        "{:<7} {:<6} {:<12} {:<8} {:<24} {:<6} {}",
        "Ch", "Source", "Frequency", "SID", "Name", "Type", "Flags"
    );
    println!("{}", "-".repeat(78));

    for ch in channels {
        let mut flags = Vec::new();
        if ch.scrambled {
            flags.push("scrambled".red().to_string());
        }
        if ch.skip {
            flags.push("hidden".dimmed().to_string());
        }
        if let Some(lcn) = ch.lcn {
            flags.push(format!("lcn={}", lcn));
        }

        println!(
            "{:<7} {:<6} {:<12} {:<8} {:<24} {:<6} {}",
            ch.display_number().bold(),
            source_label(ch.source),
            ch.frequency,
            format!("0x{:04X}", ch.service_id),
            truncate(ch.name.as_deref().unwrap_or("-"), 24),
            type_label(ch.service_type),
            flags.join(" ")
        );
    }

    println!("\nTotal: {} channels", channels.len());
}

/// Services of a scan that was not stored.
pub fn print_batch_table(batch: &StoreBatch) {
    if batch.transponders.is_empty() {
        println!("No transponders locked.");
        return;
    }

    for ts in &batch.transponders {
        let ids = match (ts.original_network_id, ts.transport_stream_id) {
            (Some(onid), Some(tsid)) => format!(" onid=0x{:04X} tsid=0x{:04X}", onid, tsid),
            (None, Some(tsid)) => format!(" tsid=0x{:04X}", tsid),
            _ => String::new(),
        };
        println!(
            "{} {}{} snr={} strength={}",
            source_label(ts.source()).bold(),
            ts.params.frequency(),
            ids,
            ts.signal.snr,
            ts.signal.strength
        );
        for service in &ts.services {
            println!(
                "    {:<8} {:<24} {:<6} vid=0x{:04X} audio={}",
                format!("0x{:04X}", service.service_id),
                truncate(&service.name, 24),
                type_label(service.service_type),
                service.video_pid,
                service.audios.len()
            );
        }
    }

    println!(
        "\nTotal: {} transponders, {} services",
        batch.transponders.len(),
        batch.service_count()
    );
}

pub fn print_history_table(history: &[ScanHistoryRecord]) {
    if history.is_empty() {
        println!("No scans recorded.");
        return;
    }

    println!(
        "{:<6} {:<20} {:<8} {:<10} {:<12} {}",
        "ID", "Time", "Source", "Result", "Transponders", "Services"
    );
    println!("{}", "-".repeat(70));
    for entry in history {
        let time = chrono::DateTime::from_timestamp(entry.scan_time, 0)
            .map(|t| {
                t.with_timezone(&chrono::Local)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
            })
            .unwrap_or_else(|| "-".to_string());
        let result = if entry.end_code == "ok" {
            entry.end_code.green().to_string()
        } else {
            entry.end_code.yellow().to_string()
        };
        println!(
            "{:<6} {:<20} {:<8} {:<10} {:<12} {}",
            entry.id,
            time,
            entry.source.map_or("-", source_label),
            result,
            entry.transponder_count,
            entry.service_count
        );
    }
}

pub fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("Das Erste HD", 5), "Das E");
        assert_eq!(truncate("ÄÖÜ", 2), "ÄÖ");
        assert_eq!(truncate("abc", 10), "abc");
    }

    #[test]
    fn test_source_labels() {
        assert_eq!(source_label(SourceKind::Analog), "ATV");
        assert_eq!(source_label(SourceKind::Atsc), "ATSC");
    }
}
