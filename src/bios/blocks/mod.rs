//! Translating a filesystem's logical block numbers into the track/sector
//! lists a disk image codec reads, per block-device convention (Apple ProDOS,
//! CP/M, and FAT each number blocks differently).

pub mod apple;
pub mod cpm;
pub mod fat;
