//! SDT (Service Description Table) parsing.
//!
//! The SDT is transmitted on PID 0x0011 and names the services of a
//! transport stream.

use super::descriptors::{find_descriptor, ServiceDescriptor};
use super::psi::{PsiSection, SiError};
use super::{descriptor_tag, table_id};

/// Service entry in the SDT.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SdtService {
    pub service_id: u16,
    pub eit_schedule_flag: bool,
    pub eit_present_following_flag: bool,
    pub running_status: u8,
    pub free_ca_mode: bool,
    /// Raw descriptor loop.
    pub descriptors: Vec<u8>,
    pub service_descriptor: Option<ServiceDescriptor>,
}

impl SdtService {
    pub fn service_name(&self) -> Option<&str> {
        self.service_descriptor
            .as_ref()
            .map(|d| d.service_name.as_str())
    }

    pub fn service_type(&self) -> Option<u8> {
        self.service_descriptor.as_ref().map(|d| d.service_type)
    }
}

/// One decoded SDT section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SdtSection {
    pub transport_stream_id: u16,
    pub original_network_id: u16,
    pub version_number: u8,
    pub services: Vec<SdtService>,
}

impl SdtSection {
    pub fn parse(section: &PsiSection) -> Result<Self, SiError> {
        if section.header.table_id != table_id::SDT_ACTUAL
            && section.header.table_id != table_id::SDT_OTHER
        {
            return Err(SiError::UnexpectedTable(section.header.table_id));
        }

        let data = section.data;
        if data.len() < 3 {
            return Err(SiError::TooShort("SDT"));
        }

        let mut sdt = SdtSection {
            transport_stream_id: section.header.table_id_extension,
            original_network_id: ((data[0] as u16) << 8) | data[1] as u16,
            version_number: section.header.version_number,
            services: Vec::new(),
        };

        let mut offset = 3;
        while offset + 5 <= data.len() {
            let service_id = ((data[offset] as u16) << 8) | data[offset + 1] as u16;
            let flags = data[offset + 2];
            let status = data[offset + 3];
            let descriptors_length = ((status as usize & 0x0F) << 8) | data[offset + 4] as usize;

            offset += 5;

            if offset + descriptors_length > data.len() {
                return Err(SiError::Malformed("SDT descriptors length"));
            }

            let descriptors = data[offset..offset + descriptors_length].to_vec();
            offset += descriptors_length;

            let service_descriptor = find_descriptor(&descriptors, descriptor_tag::SERVICE)
                .and_then(|d| ServiceDescriptor::parse(d).ok());

            sdt.services.push(SdtService {
                service_id,
                eit_schedule_flag: flags & 0x02 != 0,
                eit_present_following_flag: flags & 0x01 != 0,
                running_status: (status >> 5) & 0x07,
                free_ca_mode: status & 0x10 != 0,
                descriptors,
                service_descriptor,
            });
        }

        Ok(sdt)
    }

    pub fn find_service(&self, service_id: u16) -> Option<&SdtService> {
        self.services.iter().find(|s| s.service_id == service_id)
    }
}
