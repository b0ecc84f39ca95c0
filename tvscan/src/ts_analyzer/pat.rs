//! PAT (Program Association Table) parsing.
//!
//! The PAT is transmitted on PID 0x0000 and lists the programs of the
//! transport stream with their PMT PIDs.

use super::psi::{PsiSection, SiError};
use super::table_id;

/// A single PAT entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatProgram {
    /// Program number (0 = network PID entry).
    pub program_number: u16,
    /// PMT PID, or the NIT PID for program 0.
    pub pid: u16,
}

/// One decoded PAT section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatSection {
    pub transport_stream_id: u16,
    pub version_number: u8,
    /// Entries in section order, program 0 included.
    pub programs: Vec<PatProgram>,
}

impl PatSection {
    pub fn parse(section: &PsiSection) -> Result<Self, SiError> {
        if section.header.table_id != table_id::PAT {
            return Err(SiError::UnexpectedTable(section.header.table_id));
        }

        let data = section.data;
        if data.len() % 4 != 0 {
            return Err(SiError::Malformed("PAT program loop"));
        }

        let programs = data
            .chunks_exact(4)
            .map(|chunk| PatProgram {
                program_number: ((chunk[0] as u16) << 8) | chunk[1] as u16,
                pid: ((chunk[2] as u16 & 0x1F) << 8) | chunk[3] as u16,
            })
            .collect();

        Ok(PatSection {
            transport_stream_id: section.header.table_id_extension,
            version_number: section.header.version_number,
            programs,
        })
    }

    /// Programs carrying a PMT (program 0 excluded).
    pub fn services(&self) -> impl Iterator<Item = &PatProgram> {
        self.programs.iter().filter(|p| p.program_number != 0)
    }

    pub fn nit_pid(&self) -> Option<u16> {
        self.programs
            .iter()
            .find(|p| p.program_number == 0)
            .map(|p| p.pid)
    }

    pub fn pmt_pid(&self, program_number: u16) -> Option<u16> {
        self.services()
            .find(|p| p.program_number == program_number)
            .map(|p| p.pid)
    }
}
