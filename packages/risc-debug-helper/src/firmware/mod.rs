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

pub mod access_path;
pub mod dwarf;
pub mod elf_items;
pub mod image;
pub mod resolver;
pub mod symbols;
pub mod types;

pub use dwarf::DwarfParser;
pub use image::{ExtraVar, FirmwareImage, ImageParser};
pub use resolver::{Firmware, MemReader, MemberPath};
pub use symbols::{Symbol, SymbolOrigin};
pub use types::{Member, TypeDef, TypeGraph, TypeId, TypeKind};
