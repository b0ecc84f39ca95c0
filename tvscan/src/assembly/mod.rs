//! Turns a scan result into the transponder and service records a store
//! writes.
//!
//! DVB and ISDB services are built from the collected PMTs, named from the
//! SDT. ATSC services come from the virtual channel table. Every analog
//! carrier yields one program.

pub mod lcn;

use log::debug;
use serde::Serialize;
use tvscan_protocol::{
    AtvMode, AudioFormat, DtvMode, DtvStandard, SatelliteParams, ServiceType, SignalQuality,
    SourceKind, TuneParams, VideoFormat,
};

use crate::channel_order::OrderPolicy;
use crate::result::{AnalogTransponder, DigitalTransponder, ScanResult, TransponderRecord};
use crate::ts_analyzer::descriptors::{
    find_descriptor, parse_iso639_language, parse_subtitling, parse_teletext,
};
use crate::ts_analyzer::{descriptor_tag, PmtSection, PmtStream, SdtService, VctChannel};

pub use lcn::{LcnCandidates, LcnSlot, LCN_CONFLICT_START};

/// PID value meaning "not present".
pub const INVALID_PID: u16 = 0x1FFF;

/// Service id given to analog programs.
pub const ANALOG_SERVICE_ID: u16 = 0xFFFF;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioTrack {
    pub pid: u16,
    pub format: AudioFormat,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubtitleTrack {
    pub pid: u16,
    pub language: String,
    pub subtitling_type: u8,
    pub composition_page: u16,
    pub ancillary_page: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeletextTrack {
    pub pid: u16,
    pub language: String,
    pub teletext_type: u8,
    pub magazine: u8,
    pub page: u8,
}

/// Virtual channel fields of an ATSC service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AtscChannel {
    pub major: u16,
    pub minor: u16,
    pub access_controlled: bool,
    pub hidden: bool,
    pub hide_guide: bool,
    pub source_id: u16,
}

/// Everything stored for one service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceAssemblyRecord {
    pub service_id: u16,
    pub name: String,
    pub service_type: ServiceType,
    pub video_pid: u16,
    pub video_format: Option<VideoFormat>,
    pub pcr_pid: u16,
    pub audios: Vec<AudioTrack>,
    pub subtitles: Vec<SubtitleTrack>,
    pub teletexts: Vec<TeletextTrack>,
    pub scrambled: bool,
    pub free_ca: bool,
    pub eit_schedule: bool,
    pub eit_present_following: bool,
    pub running_status: u8,
    #[serde(skip)]
    pub lcn: LcnCandidates,
    pub atsc: Option<AtscChannel>,
}

impl ServiceAssemblyRecord {
    pub fn new(service_id: u16) -> Self {
        Self {
            service_id,
            name: String::new(),
            service_type: ServiceType::Unknown,
            video_pid: INVALID_PID,
            video_format: None,
            pcr_pid: INVALID_PID,
            audios: Vec::new(),
            subtitles: Vec::new(),
            teletexts: Vec::new(),
            scrambled: false,
            free_ca: true,
            eit_schedule: false,
            eit_present_following: false,
            running_status: 0,
            lcn: LcnCandidates::default(),
            atsc: None,
        }
    }

    fn add_audio(&mut self, pid: u16, format: AudioFormat, language: Option<String>) {
        if self.audios.iter().any(|a| a.pid == pid) {
            return;
        }
        let language = language
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| format!("Audio{}", self.audios.len() + 1));
        self.audios.push(AudioTrack {
            pid,
            format,
            language,
        });
    }

    /// Pick up the first video stream and every audio, subtitle and teletext
    /// entry of one elementary stream.
    fn add_stream(&mut self, stream: &PmtStream) {
        if let Some(format) = stream.video_format() {
            if self.video_pid == INVALID_PID {
                self.video_pid = stream.elementary_pid;
                self.video_format = Some(format);
            }
        } else if let Some(format) = stream.audio_format() {
            let language = find_descriptor(&stream.descriptors, descriptor_tag::ISO_639_LANGUAGE)
                .and_then(parse_iso639_language);
            self.add_audio(stream.elementary_pid, format, language);
        }

        if let Some(body) = find_descriptor(&stream.descriptors, descriptor_tag::SUBTITLING) {
            self.subtitles
                .extend(parse_subtitling(body).into_iter().map(|s| SubtitleTrack {
                    pid: stream.elementary_pid,
                    language: s.language,
                    subtitling_type: s.subtitling_type,
                    composition_page: s.composition_page_id,
                    ancillary_page: s.ancillary_page_id,
                }));
        }
        if let Some(body) = find_descriptor(&stream.descriptors, descriptor_tag::TELETEXT) {
            self.teletexts
                .extend(parse_teletext(body).into_iter().map(|t| TeletextTrack {
                    pid: stream.elementary_pid,
                    language: t.language,
                    teletext_type: t.teletext_type,
                    magazine: t.magazine_number,
                    page: t.page_number,
                }));
        }
    }

    fn apply_pmt(&mut self, pmt: &PmtSection) {
        self.pcr_pid = pmt.pcr_pid;
        self.scrambled |= pmt.is_scrambled();
        for stream in &pmt.streams {
            self.add_stream(stream);
        }
    }

    fn apply_sdt(&mut self, service: &SdtService, standard: DtvStandard) {
        self.eit_schedule = service.eit_schedule_flag;
        self.eit_present_following = service.eit_present_following_flag;
        self.running_status = service.running_status;
        self.free_ca = service.free_ca_mode;
        if let Some(name) = service.service_name().filter(|n| !n.is_empty()) {
            self.name = name.to_string();
        }
        if let Some(raw) = service.service_type() {
            self.service_type = classify(raw, standard);
        }
    }

    /// Correct the announced type with what the streams actually carry.
    fn settle_type(&mut self, standard: DtvStandard) {
        if self.video_pid != INVALID_PID {
            self.service_type = ServiceType::Tv;
        } else if self.audios.first().is_some_and(|a| a.pid < INVALID_PID) {
            self.service_type = ServiceType::Radio;
        }

        if self.video_pid == INVALID_PID
            && self.audios.is_empty()
            && self.service_type.is_tv_or_radio()
        {
            self.service_type = ServiceType::Unknown;
        }

        if self.name.is_empty()
            && self.service_type.is_tv_or_radio()
            && standard != DtvStandard::Atsc
        {
            self.name = "No Name".to_string();
        }
    }
}

/// Map a raw SDT or VCT service type.
pub fn classify(raw: u8, standard: DtvStandard) -> ServiceType {
    match standard {
        DtvStandard::Atsc => match raw {
            0x02 => ServiceType::Tv,
            0x03 => ServiceType::Radio,
            other => ServiceType::Other(other),
        },
        DtvStandard::Dvb | DtvStandard::Isdb => match raw {
            // 0x16 and 0x19 are advanced codec TV, 0xC0 is ISDB partial reception.
            0x01 | 0x16 | 0x19 | 0xC0 => ServiceType::Tv,
            0x02 => ServiceType::Radio,
            other => ServiceType::Other(other),
        },
    }
}

/// One transponder ready to be written.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransponderEntry {
    pub params: TuneParams,
    pub signal: SignalQuality,
    pub transport_stream_id: Option<u16>,
    pub original_network_id: Option<u16>,
    pub services: Vec<ServiceAssemblyRecord>,
}

impl TransponderEntry {
    pub fn source(&self) -> SourceKind {
        self.params.source()
    }
}

/// Old records a store removes before writing new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearScope {
    /// Update in place.
    Nothing,
    /// Every record of one source.
    Source(SourceKind),
    /// Every record referencing the scanned satellite.
    Satellite,
}

/// The full write set of one scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreBatch {
    pub standard: Option<DtvStandard>,
    pub clear_digital: ClearScope,
    pub clear_analog: bool,
    pub satellite: Option<SatelliteParams>,
    /// Numbering of the digital services; `None` for analog-only scans.
    pub order: Option<OrderPolicy>,
    pub transponders: Vec<TransponderEntry>,
}

impl StoreBatch {
    pub fn service_count(&self) -> usize {
        self.transponders.iter().map(|t| t.services.len()).sum()
    }

    pub fn has_digital(&self) -> bool {
        self.transponders.iter().any(|t| !t.params.is_analog())
    }

    pub fn has_analog(&self) -> bool {
        self.transponders.iter().any(|t| t.params.is_analog())
    }
}

/// Build the write set for `result`.
pub fn assemble(result: &ScanResult) -> StoreBatch {
    let dtv = result.config.dtv.as_ref();
    let standard = dtv.map(|d| d.standard);
    let digital: Vec<&DigitalTransponder> = result.digital().collect();

    let mut transponders = Vec::new();
    let mut digital_index = 0;
    for record in &result.transponders {
        match record {
            TransponderRecord::Analog(analog) => transponders.push(analog_entry(analog)),
            TransponderRecord::Digital(ts) => {
                let index = digital_index;
                digital_index += 1;
                let entry = match standard {
                    Some(DtvStandard::Atsc) => atsc_entry(ts),
                    _ => {
                        let others = digital
                            .iter()
                            .enumerate()
                            .filter(|&(i, _)| i != index)
                            .map(|(_, other)| other.nits.as_slice())
                            .chain(std::iter::once(result.nits.as_slice()));
                        dvb_entry(ts, standard.unwrap_or(DtvStandard::Dvb), others)
                    }
                };
                match entry {
                    Some(entry) => transponders.push(entry),
                    None => debug!(
                        "Assembly: no PAT on {}, transponder not stored",
                        ts.params.frequency()
                    ),
                }
            }
        }
    }

    let mut batch = StoreBatch {
        standard,
        clear_digital: ClearScope::Nothing,
        clear_analog: false,
        satellite: None,
        order: dtv.map(OrderPolicy::for_config),
        transponders,
    };

    if batch.has_digital() {
        if let Some(dtv) = dtv {
            if dtv.source == SourceKind::Satellite {
                batch.satellite = dtv.satellite.clone();
                if dtv.mode != DtvMode::Manual && batch.satellite.is_some() {
                    batch.clear_digital = ClearScope::Satellite;
                }
            } else if dtv.mode != DtvMode::Manual {
                batch.clear_digital = ClearScope::Source(dtv.source);
            }
        }
    }
    batch.clear_analog = batch.has_analog()
        && result
            .config
            .atv
            .as_ref()
            .is_some_and(|atv| atv.mode == AtvMode::Auto);

    batch
}

fn analog_entry(analog: &AnalogTransponder) -> TransponderEntry {
    let mut service = ServiceAssemblyRecord::new(ANALOG_SERVICE_ID);
    service.name = "ATV Program".to_string();
    service.service_type = ServiceType::Atv;
    service.add_audio(INVALID_PID, AudioFormat::Unknown, None);

    TransponderEntry {
        params: TuneParams::Analog {
            frequency: analog.frequency,
            audio_std: analog.audio_std,
            video_std: analog.video_std,
        },
        signal: SignalQuality::default(),
        transport_stream_id: None,
        original_network_id: None,
        services: vec![service],
    }
}

fn dvb_entry<'a>(
    ts: &DigitalTransponder,
    standard: DtvStandard,
    others: impl Iterator<Item = &'a [crate::ts_analyzer::NitSection]> + Clone,
) -> Option<TransponderEntry> {
    if ts.pats.is_empty() {
        return None;
    }
    let tsid = ts.transport_stream_id();
    let onid = ts.original_network_id();

    let services = ts
        .pmts
        .iter()
        .map(|pmt| {
            let mut service = ServiceAssemblyRecord::new(pmt.program_number);
            service.apply_pmt(pmt);
            if let Some(sdt) = ts
                .sdts
                .iter()
                .find_map(|sdt| sdt.find_service(pmt.program_number))
            {
                service.apply_sdt(sdt, standard);
            }
            service.settle_type(standard);
            if let (Some(tsid), Some(onid)) = (tsid, onid) {
                service.lcn = LcnCandidates::search(
                    &ts.nits,
                    others.clone(),
                    onid,
                    tsid,
                    pmt.program_number,
                );
            }
            service
        })
        .collect();

    Some(TransponderEntry {
        params: ts.params,
        signal: ts.signal,
        transport_stream_id: tsid,
        original_network_id: onid,
        services,
    })
}

fn atsc_entry(ts: &DigitalTransponder) -> Option<TransponderEntry> {
    let channels: Vec<&VctChannel> = ts
        .vcts
        .iter()
        .flat_map(|vct| vct.local_channels())
        .collect();
    if channels.is_empty() && ts.pats.is_empty() {
        return None;
    }

    let services = if channels.is_empty() {
        ts.pmts
            .iter()
            .map(|pmt| {
                let mut service = ServiceAssemblyRecord::new(pmt.program_number);
                service.apply_pmt(pmt);
                service.settle_type(DtvStandard::Atsc);
                service
            })
            .collect()
    } else {
        channels
            .into_iter()
            .map(|channel| atsc_service(ts, channel))
            .collect()
    };

    Some(TransponderEntry {
        params: ts.params,
        signal: ts.signal,
        transport_stream_id: ts.transport_stream_id(),
        original_network_id: None,
        services,
    })
}

fn atsc_service(ts: &DigitalTransponder, channel: &VctChannel) -> ServiceAssemblyRecord {
    let mut service = ServiceAssemblyRecord::new(channel.program_number);
    service.name = channel.short_name.clone();
    service.service_type = classify(channel.service_type, DtvStandard::Atsc);
    service.scrambled = channel.access_controlled;
    service.atsc = Some(AtscChannel {
        major: channel.major_channel_number,
        minor: channel.minor_channel_number,
        access_controlled: channel.access_controlled,
        hidden: channel.hidden,
        hide_guide: channel.hide_guide,
        source_id: channel.source_id,
    });

    if let Some(pmt) = ts.pmt(channel.program_number) {
        service.apply_pmt(pmt);
    } else if let Some(location) = channel.service_location() {
        service.pcr_pid = location.pcr_pid;
        for element in &location.elements {
            let stream = PmtStream {
                stream_type: element.stream_type,
                elementary_pid: element.elementary_pid,
                descriptors: Vec::new(),
            };
            if let Some(format) = stream.video_format() {
                if service.video_pid == INVALID_PID {
                    service.video_pid = element.elementary_pid;
                    service.video_format = Some(format);
                }
            } else if let Some(format) = stream.audio_format() {
                service.add_audio(
                    element.elementary_pid,
                    format,
                    Some(element.language.clone()),
                );
            }
        }
    }

    service.settle_type(DtvStandard::Atsc);
    service
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AtvConfig, DtvConfig, ScanConfig};
    use crate::ts_analyzer::descriptors::ServiceDescriptor;
    use crate::ts_analyzer::{
        stream_type, NitSection, NitTransportStream, PatProgram, PatSection, SdtSection,
        VctSection,
    };
    use tvscan_protocol::{Bandwidth, Modulation};

    fn pmt(program_number: u16, streams: Vec<PmtStream>, program_info: Vec<u8>) -> PmtSection {
        PmtSection {
            program_number,
            version_number: 0,
            pcr_pid: 0x100,
            program_info,
            streams,
        }
    }

    fn stream(stream_type: u8, elementary_pid: u16, descriptors: Vec<u8>) -> PmtStream {
        PmtStream {
            stream_type,
            elementary_pid,
            descriptors,
        }
    }

    fn sdt_service(service_id: u16, service_type: u8, name: &str) -> SdtService {
        SdtService {
            service_id,
            eit_schedule_flag: true,
            eit_present_following_flag: true,
            running_status: 4,
            free_ca_mode: false,
            descriptors: Vec::new(),
            service_descriptor: Some(ServiceDescriptor {
                service_type,
                provider_name: String::new(),
                service_name: name.to_string(),
            }),
        }
    }

    fn terrestrial() -> TuneParams {
        TuneParams::Terrestrial {
            frequency: 474_000_000,
            bandwidth: Bandwidth::Mhz8,
        }
    }

    fn dvb_transponder() -> DigitalTransponder {
        let mut ts = DigitalTransponder::new(terrestrial(), SignalQuality::default());
        ts.pats.push(PatSection {
            transport_stream_id: 1,
            version_number: 0,
            programs: vec![
                PatProgram { program_number: 101, pid: 0x100 },
                PatProgram { program_number: 102, pid: 0x200 },
                PatProgram { program_number: 103, pid: 0x300 },
            ],
        });
        ts.pmts.push(pmt(
            101,
            vec![
                stream(stream_type::MPEG2_VIDEO, 0x101, Vec::new()),
                stream(stream_type::MPEG1_AUDIO, 0x102, vec![0x0A, 0x04, b'e', b'n', b'g', 0]),
                stream(stream_type::MPEG1_AUDIO, 0x102, Vec::new()),
                stream(stream_type::MPEG2_AUDIO, 0x103, Vec::new()),
                stream(
                    stream_type::PES_PRIVATE_DATA,
                    0x104,
                    vec![0x59, 0x08, b'd', b'e', b'u', 0x10, 0x00, 0x01, 0x00, 0x02],
                ),
            ],
            vec![0x09, 0x04, 0x0B, 0x00, 0xE1, 0x00],
        ));
        ts.pmts.push(pmt(
            102,
            vec![stream(stream_type::MPEG1_AUDIO, 0x201, Vec::new())],
            Vec::new(),
        ));
        ts.pmts.push(pmt(103, Vec::new(), Vec::new()));
        ts.sdts.push(SdtSection {
            transport_stream_id: 1,
            original_network_id: 0x20,
            version_number: 0,
            services: vec![sdt_service(101, 0x01, "One"), sdt_service(103, 0x01, "Data")],
        });
        ts
    }

    fn dtv_config(mode: DtvMode) -> ScanConfig {
        ScanConfig {
            dtv: Some(DtvConfig {
                source: SourceKind::Terrestrial,
                mode,
                ..DtvConfig::default()
            }),
            ..ScanConfig::default()
        }
    }

    #[test]
    fn test_dvb_services_from_pmts() {
        let mut result = ScanResult::new(dtv_config(DtvMode::AllBand));
        result
            .transponders
            .push(TransponderRecord::Digital(dvb_transponder()));

        let batch = assemble(&result);
        assert_eq!(batch.clear_digital, ClearScope::Source(SourceKind::Terrestrial));
        assert_eq!(batch.transponders.len(), 1);
        let services = &batch.transponders[0].services;
        assert_eq!(services.len(), 3);

        let tv = &services[0];
        assert_eq!(tv.name, "One");
        assert_eq!(tv.service_type, ServiceType::Tv);
        assert_eq!(tv.video_pid, 0x101);
        assert_eq!(tv.video_format, Some(VideoFormat::Mpeg2));
        assert!(tv.scrambled);
        assert!(!tv.free_ca);
        assert_eq!(
            tv.audios.iter().map(|a| (a.pid, a.language.as_str())).collect::<Vec<_>>(),
            vec![(0x102, "eng"), (0x103, "Audio2")]
        );
        assert_eq!(tv.subtitles.len(), 1);
        assert_eq!(tv.subtitles[0].pid, 0x104);
        assert_eq!(tv.subtitles[0].composition_page, 1);

        let radio = &services[1];
        assert_eq!(radio.service_type, ServiceType::Radio);
        assert_eq!(radio.name, "No Name");
        assert!(radio.free_ca);

        assert_eq!(services[2].service_type, ServiceType::Unknown);
        assert_eq!(services[2].name, "Data");
    }

    #[test]
    fn test_transponder_without_pat_skipped() {
        let mut result = ScanResult::new(dtv_config(DtvMode::Manual));
        let mut ts = dvb_transponder();
        ts.pats.clear();
        result.transponders.push(TransponderRecord::Digital(ts));

        let batch = assemble(&result);
        assert!(batch.transponders.is_empty());
        assert_eq!(batch.clear_digital, ClearScope::Nothing);
    }

    #[test]
    fn test_lcn_from_other_transponder() {
        let mut result = ScanResult::new(dtv_config(DtvMode::Auto));
        result
            .transponders
            .push(TransponderRecord::Digital(dvb_transponder()));
        let mut other = DigitalTransponder::new(
            terrestrial().with_frequency(482_000_000),
            SignalQuality::default(),
        );
        other.nits.push(NitSection {
            network_id: 1,
            version_number: 0,
            section_number: 0,
            network_name: None,
            network_descriptors: Vec::new(),
            transport_streams: vec![NitTransportStream {
                transport_stream_id: 1,
                original_network_id: 0x20,
                descriptors: vec![0x83, 0x04, 0x00, 101, 0xFC, 7],
            }],
        });
        result.transponders.push(TransponderRecord::Digital(other));

        let batch = assemble(&result);
        assert_eq!(batch.transponders.len(), 1);
        let lcn = batch.transponders[0].services[0].lcn;
        assert_eq!(lcn.sd.map(|e| e.lcn), Some(7));
        assert!(batch.transponders[0].services[1].lcn.is_empty());
    }

    #[test]
    fn test_analog_program() {
        let config = ScanConfig {
            atv: Some(AtvConfig {
                mode: AtvMode::Auto,
                frequencies: vec![44_250_000, 863_250_000, 44_250_000],
                ..AtvConfig::default()
            }),
            ..ScanConfig::default()
        };
        let mut result = ScanResult::new(config);
        result
            .transponders
            .push(TransponderRecord::Analog(AnalogTransponder {
                frequency: 48_250_000,
                audio_std: 1,
                video_std: 2,
            }));

        let batch = assemble(&result);
        assert!(batch.clear_analog);
        assert_eq!(batch.clear_digital, ClearScope::Nothing);
        let service = &batch.transponders[0].services[0];
        assert_eq!(service.name, "ATV Program");
        assert_eq!(service.service_type, ServiceType::Atv);
        assert_eq!(service.audios[0].pid, INVALID_PID);
        assert_eq!(
            batch.transponders[0].params,
            TuneParams::Analog {
                frequency: 48_250_000,
                audio_std: 1,
                video_std: 2
            }
        );
    }

    #[test]
    fn test_atsc_services_from_vct() {
        let mut config = dtv_config(DtvMode::AllBand);
        if let Some(dtv) = config.dtv.as_mut() {
            dtv.standard = DtvStandard::Atsc;
            dtv.source = SourceKind::Atsc;
        }
        let mut result = ScanResult::new(config);
        let mut ts = DigitalTransponder::new(
            TuneParams::Atsc {
                frequency: 57_000_000,
                modulation: Modulation::Vsb8,
            },
            SignalQuality::default(),
        );
        let location = vec![
            0xA1, 0x0F, 0xE1, 0x00, 0x02, // pcr 0x100, two elements
            0x02, 0xE1, 0x01, b'e', b'n', b'g', // video
            0x81, 0xE1, 0x02, b's', b'p', b'a', // AC-3 audio
        ];
        ts.vcts.push(VctSection {
            table_id: 0xC8,
            transport_stream_id: 0x0A,
            version_number: 0,
            channels: vec![VctChannel {
                short_name: "KABC".to_string(),
                major_channel_number: 7,
                minor_channel_number: 1,
                modulation_mode: 4,
                carrier_frequency: 0,
                channel_tsid: 0x0A,
                program_number: 3,
                access_controlled: false,
                hidden: false,
                hide_guide: false,
                service_type: 0x02,
                source_id: 9,
                descriptors: location,
            }],
        });
        result.transponders.push(TransponderRecord::Digital(ts));

        let batch = assemble(&result);
        let service = &batch.transponders[0].services[0];
        assert_eq!(service.service_id, 3);
        assert_eq!(service.name, "KABC");
        assert_eq!(service.service_type, ServiceType::Tv);
        assert_eq!(service.video_pid, 0x101);
        assert_eq!(service.audios[0].format, AudioFormat::Ac3);
        assert_eq!(service.audios[0].language, "spa");
        assert_eq!(service.atsc.map(|a| (a.major, a.minor)), Some((7, 1)));
        assert!(service.lcn.is_empty());
    }

    #[test]
    fn test_classify_by_standard() {
        assert_eq!(classify(0x19, DtvStandard::Dvb), ServiceType::Tv);
        assert_eq!(classify(0xC0, DtvStandard::Isdb), ServiceType::Tv);
        assert_eq!(classify(0x02, DtvStandard::Dvb), ServiceType::Radio);
        assert_eq!(classify(0x02, DtvStandard::Atsc), ServiceType::Tv);
        assert_eq!(classify(0x03, DtvStandard::Atsc), ServiceType::Radio);
        assert_eq!(classify(0x0C, DtvStandard::Dvb), ServiceType::Other(0x0C));
    }
}
