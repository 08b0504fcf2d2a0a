// Copyright (c) 2026 MCU-Debug Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::error::TransportError;
use crate::location::CoreLocation;

/// Raw register and memory access to a core, over whatever backs the session
/// (PCI on a local device, a debug server, or a replayed cache).
pub trait RegisterTransport {
    fn read_register(
        &self,
        location: &CoreLocation,
        noc_id: u8,
        address: u32,
    ) -> Result<u32, TransportError>;

    fn write_register(
        &self,
        location: &CoreLocation,
        noc_id: u8,
        address: u32,
        value: u32,
    ) -> Result<(), TransportError>;

    /// Block read through the NoC. The default issues one 32-bit read per word;
    /// transports with a burst path should override it.
    fn read_block(
        &self,
        location: &CoreLocation,
        noc_id: u8,
        address: u32,
        byte_count: usize,
    ) -> Result<Vec<u8>, TransportError> {
        let mut data = Vec::with_capacity(byte_count.next_multiple_of(4));
        let mut offset = 0u32;
        while (offset as usize) < byte_count {
            let word = self.read_register(location, noc_id, address + offset)?;
            data.extend_from_slice(&word.to_le_bytes());
            offset += 4;
        }
        data.truncate(byte_count);
        Ok(data)
    }

    /// Block write through the NoC; a trailing partial word is zero-padded.
    fn write_block(
        &self,
        location: &CoreLocation,
        noc_id: u8,
        address: u32,
        data: &[u8],
    ) -> Result<(), TransportError> {
        for (i, chunk) in data.chunks(4).enumerate() {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            self.write_register(
                location,
                noc_id,
                address + (i as u32) * 4,
                u32::from_le_bytes(word),
            )?;
        }
        Ok(())
    }
}

impl<T: RegisterTransport + ?Sized> RegisterTransport for &T {
    fn read_register(
        &self,
        location: &CoreLocation,
        noc_id: u8,
        address: u32,
    ) -> Result<u32, TransportError> {
        (**self).read_register(location, noc_id, address)
    }

    fn write_register(
        &self,
        location: &CoreLocation,
        noc_id: u8,
        address: u32,
        value: u32,
    ) -> Result<(), TransportError> {
        (**self).write_register(location, noc_id, address, value)
    }

    fn read_block(
        &self,
        location: &CoreLocation,
        noc_id: u8,
        address: u32,
        byte_count: usize,
    ) -> Result<Vec<u8>, TransportError> {
        (**self).read_block(location, noc_id, address, byte_count)
    }

    fn write_block(
        &self,
        location: &CoreLocation,
        noc_id: u8,
        address: u32,
        data: &[u8],
    ) -> Result<(), TransportError> {
        (**self).write_block(location, noc_id, address, data)
    }
}
