//! Persistent settings storage
//!
//! The [`SettingsStore`] trait is the named string/bool store the configuration
//! handlers work against. Two implementations:
//!
//! - [`FlashStore`] keeps settings in a reserved flash range using the
//!   `sequential-storage` map, giving wear leveling and power-fail safety
//! - [`MemoryStore`] keeps them in RAM, for tests and boards without spare flash
//!
//! Every item is stored as a tag byte followed by the payload: UTF-8 text for
//! strings, one byte for flags.

use core::ops::Range;

use embedded_storage_async::nor_flash::NorFlash;
use heapless::FnvIndexMap;
use sequential_storage::{
    cache::NoCache,
    map::{fetch_item, store_item, Key, SerializationError, Value},
};
use thiserror_no_std::Error;

use super::config::{SettingKey, SettingValue};

/// Scratch buffer for one serialized item, key and tag included
const DATA_BUFFER_SIZE: usize = 128;

const TAG_TEXT: u8 = 0;
const TAG_FLAG: u8 = 1;
const TAG_REMOVED: u8 = 2;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StoreError {
    #[error("flash access failed")]
    Flash,

    #[error("settings storage is full")]
    Full,

    #[error("settings storage is corrupted")]
    Corrupted,

    #[error("setting value longer than 64 bytes")]
    ValueTooLong,

    /// A flag was requested where text is stored, or the other way round
    #[error("setting has a different type")]
    TypeMismatch,
}

/// Named string and bool settings
pub trait SettingsStore {
    /// Stored text for `key`, or `default` if nothing is stored yet
    async fn get_string(&mut self, key: SettingKey, default: &str) -> Result<SettingValue, StoreError>;

    async fn put_string(&mut self, key: SettingKey, value: &str) -> Result<(), StoreError>;

    /// Stored flag for `key`, or `default` if nothing is stored yet
    async fn get_bool(&mut self, key: SettingKey, default: bool) -> Result<bool, StoreError>;

    async fn put_bool(&mut self, key: SettingKey, value: bool) -> Result<(), StoreError>;

    /// Drop `key` so the next read falls back to its default
    async fn remove(&mut self, key: SettingKey) -> Result<(), StoreError>;
}

/// One stored item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredSetting {
    Text(SettingValue),
    Flag(bool),
    /// Tombstone left by [`SettingsStore::remove`]
    Removed,
}

impl StoredSetting {
    fn text(value: &str) -> Result<Self, StoreError> {
        SettingValue::try_from(value)
            .map(StoredSetting::Text)
            .map_err(|_| StoreError::ValueTooLong)
    }

    fn into_text(self, default: &str) -> Result<SettingValue, StoreError> {
        match self {
            StoredSetting::Text(text) => Ok(text),
            StoredSetting::Removed => {
                SettingValue::try_from(default).map_err(|_| StoreError::ValueTooLong)
            }
            StoredSetting::Flag(_) => Err(StoreError::TypeMismatch),
        }
    }

    fn into_flag(self, default: bool) -> Result<bool, StoreError> {
        match self {
            StoredSetting::Flag(flag) => Ok(flag),
            StoredSetting::Removed => Ok(default),
            StoredSetting::Text(_) => Err(StoreError::TypeMismatch),
        }
    }
}

impl Key for SettingKey {
    fn serialize_into(&self, buffer: &mut [u8]) -> Result<usize, SerializationError> {
        if buffer.is_empty() {
            return Err(SerializationError::BufferTooSmall);
        }
        buffer[0] = *self as u8;
        Ok(1)
    }

    fn deserialize_from(buffer: &[u8]) -> Result<(Self, usize), SerializationError> {
        let id = *buffer.first().ok_or(SerializationError::BufferTooSmall)?;
        SettingKey::from_id(id)
            .map(|key| (key, 1))
            .ok_or(SerializationError::InvalidFormat)
    }
}

impl Value<'_> for StoredSetting {
    fn serialize_into(&self, buffer: &mut [u8]) -> Result<usize, SerializationError> {
        let len = match self {
            StoredSetting::Text(text) => 1 + text.len(),
            StoredSetting::Flag(_) => 2,
            StoredSetting::Removed => 1,
        };
        if buffer.len() < len {
            return Err(SerializationError::BufferTooSmall);
        }

        match self {
            StoredSetting::Text(text) => {
                buffer[0] = TAG_TEXT;
                buffer[1..len].copy_from_slice(text.as_bytes());
            }
            StoredSetting::Flag(flag) => {
                buffer[0] = TAG_FLAG;
                buffer[1] = u8::from(*flag);
            }
            StoredSetting::Removed => {
                buffer[0] = TAG_REMOVED;
            }
        }
        Ok(len)
    }

    fn deserialize_from(buffer: &[u8]) -> Result<Self, SerializationError> {
        match buffer {
            [TAG_TEXT, text @ ..] => {
                let text = core::str::from_utf8(text).map_err(|_| SerializationError::InvalidFormat)?;
                SettingValue::try_from(text)
                    .map(StoredSetting::Text)
                    .map_err(|_| SerializationError::InvalidFormat)
            }
            [TAG_FLAG, flag] => Ok(StoredSetting::Flag(*flag != 0)),
            [TAG_REMOVED] => Ok(StoredSetting::Removed),
            [] => Err(SerializationError::BufferTooSmall),
            _ => Err(SerializationError::InvalidFormat),
        }
    }
}

/// Settings kept in a `sequential-storage` map on NOR flash
pub struct FlashStore<F> {
    flash: F,
    range: Range<u32>,
    cache: NoCache,
    buffer: [u8; DATA_BUFFER_SIZE],
}

impl<F: NorFlash> FlashStore<F> {
    /// `range` must be erase-aligned and span at least two erase pages
    pub fn new(flash: F, range: Range<u32>) -> Self {
        Self {
            flash,
            range,
            cache: NoCache::new(),
            buffer: [0; DATA_BUFFER_SIZE],
        }
    }

    async fn fetch(&mut self, key: SettingKey) -> Result<Option<StoredSetting>, StoreError> {
        fetch_item::<SettingKey, StoredSetting, _>(
            &mut self.flash,
            self.range.clone(),
            &mut self.cache,
            &mut self.buffer,
            &key,
        )
        .await
        .map_err(|e| {
            error!("failed to read setting {}", key.name());
            map_storage_error(e)
        })
    }

    async fn store(&mut self, key: SettingKey, item: &StoredSetting) -> Result<(), StoreError> {
        store_item(
            &mut self.flash,
            self.range.clone(),
            &mut self.cache,
            &mut self.buffer,
            &key,
            item,
        )
        .await
        .map_err(|e| {
            error!("failed to store setting {}", key.name());
            map_storage_error(e)
        })
    }
}

fn map_storage_error<E>(error: sequential_storage::Error<E>) -> StoreError {
    match error {
        sequential_storage::Error::Storage { .. } => StoreError::Flash,
        sequential_storage::Error::FullStorage => StoreError::Full,
        _ => StoreError::Corrupted,
    }
}

impl<F: NorFlash> SettingsStore for FlashStore<F> {
    async fn get_string(&mut self, key: SettingKey, default: &str) -> Result<SettingValue, StoreError> {
        self.fetch(key)
            .await?
            .unwrap_or(StoredSetting::Removed)
            .into_text(default)
    }

    async fn put_string(&mut self, key: SettingKey, value: &str) -> Result<(), StoreError> {
        let item = StoredSetting::text(value)?;
        self.store(key, &item).await
    }

    async fn get_bool(&mut self, key: SettingKey, default: bool) -> Result<bool, StoreError> {
        self.fetch(key)
            .await?
            .unwrap_or(StoredSetting::Removed)
            .into_flag(default)
    }

    async fn put_bool(&mut self, key: SettingKey, value: bool) -> Result<(), StoreError> {
        self.store(key, &StoredSetting::Flag(value)).await
    }

    async fn remove(&mut self, key: SettingKey) -> Result<(), StoreError> {
        self.store(key, &StoredSetting::Removed).await
    }
}

/// Settings kept in RAM, lost on reset
#[derive(Default)]
pub struct MemoryStore {
    items: FnvIndexMap<SettingKey, StoredSetting, 16>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw stored item, `None` if the key was never written or was removed
    pub fn item(&self, key: SettingKey) -> Option<&StoredSetting> {
        self.items.get(&key)
    }

    fn insert(&mut self, key: SettingKey, item: StoredSetting) -> Result<(), StoreError> {
        self.items
            .insert(key, item)
            .map(|_| ())
            .map_err(|_| StoreError::Full)
    }
}

impl SettingsStore for MemoryStore {
    async fn get_string(&mut self, key: SettingKey, default: &str) -> Result<SettingValue, StoreError> {
        self.items
            .get(&key)
            .cloned()
            .unwrap_or(StoredSetting::Removed)
            .into_text(default)
    }

    async fn put_string(&mut self, key: SettingKey, value: &str) -> Result<(), StoreError> {
        let item = StoredSetting::text(value)?;
        self.insert(key, item)
    }

    async fn get_bool(&mut self, key: SettingKey, default: bool) -> Result<bool, StoreError> {
        self.items
            .get(&key)
            .cloned()
            .unwrap_or(StoredSetting::Removed)
            .into_flag(default)
    }

    async fn put_bool(&mut self, key: SettingKey, value: bool) -> Result<(), StoreError> {
        self.insert(key, StoredSetting::Flag(value))
    }

    async fn remove(&mut self, key: SettingKey) -> Result<(), StoreError> {
        self.items.remove(&key);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use embassy_futures::block_on;
    use embedded_storage_async::nor_flash::{ErrorType, NorFlashErrorKind, ReadNorFlash};

    const PAGE_SIZE: usize = 1024;
    const PAGES: usize = 4;

    /// NOR flash in RAM: erased bytes read 0xff and writes can only clear bits
    pub struct RamFlash {
        data: [u8; PAGE_SIZE * PAGES],
    }

    impl RamFlash {
        pub fn new() -> Self {
            Self {
                data: [0xff; PAGE_SIZE * PAGES],
            }
        }

        pub fn range() -> Range<u32> {
            0..(PAGE_SIZE * PAGES) as u32
        }

        fn check(&self, offset: u32, len: usize, align: usize) -> Result<usize, NorFlashErrorKind> {
            let offset = offset as usize;
            if offset % align != 0 || len % align != 0 {
                return Err(NorFlashErrorKind::NotAligned);
            }
            if offset + len > self.data.len() {
                return Err(NorFlashErrorKind::OutOfBounds);
            }
            Ok(offset)
        }
    }

    impl ErrorType for RamFlash {
        type Error = NorFlashErrorKind;
    }

    impl ReadNorFlash for RamFlash {
        const READ_SIZE: usize = 1;

        async fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
            let start = self.check(offset, bytes.len(), Self::READ_SIZE)?;
            bytes.copy_from_slice(&self.data[start..start + bytes.len()]);
            Ok(())
        }

        fn capacity(&self) -> usize {
            self.data.len()
        }
    }

    impl NorFlash for RamFlash {
        const WRITE_SIZE: usize = 4;
        const ERASE_SIZE: usize = PAGE_SIZE;

        async fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
            let start = self.check(from, (to - from) as usize, Self::ERASE_SIZE)?;
            self.data[start..to as usize].fill(0xff);
            Ok(())
        }

        async fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
            let start = self.check(offset, bytes.len(), Self::WRITE_SIZE)?;
            for (cell, byte) in self.data[start..start + bytes.len()].iter_mut().zip(bytes) {
                *cell &= *byte;
            }
            Ok(())
        }
    }

    #[test]
    fn item_encoding() {
        let mut buf = [0u8; 8];
        let len = StoredSetting::text("8080").unwrap().serialize_into(&mut buf).unwrap();
        assert_eq!(&buf[..len], &[TAG_TEXT, b'8', b'0', b'8', b'0']);

        let len = StoredSetting::Flag(true).serialize_into(&mut buf).unwrap();
        assert_eq!(&buf[..len], &[TAG_FLAG, 1]);

        assert_eq!(
            StoredSetting::text("too long for this buffer").unwrap().serialize_into(&mut buf),
            Err(SerializationError::BufferTooSmall)
        );
        assert_eq!(
            StoredSetting::deserialize_from(&[TAG_FLAG, 1, 1]),
            Err(SerializationError::InvalidFormat)
        );
        assert_eq!(
            StoredSetting::deserialize_from(&[TAG_TEXT, 0xff]),
            Err(SerializationError::InvalidFormat)
        );
    }

    #[test]
    fn unknown_key_id_is_rejected() {
        assert_eq!(
            <SettingKey as Key>::deserialize_from(&[0xee]),
            Err(SerializationError::InvalidFormat)
        );
    }

    #[test]
    fn flash_store_round_trip() {
        let mut store = FlashStore::new(RamFlash::new(), RamFlash::range());
        block_on(async {
            assert_eq!(store.get_string(SettingKey::Token, "fallback").await.unwrap(), "fallback");
            assert!(!store.get_bool(SettingKey::ConfigSaved, false).await.unwrap());

            store.put_string(SettingKey::Token, "abc").await.unwrap();
            store.put_string(SettingKey::Token, "abcd").await.unwrap();
            store.put_bool(SettingKey::ConfigSaved, true).await.unwrap();

            assert_eq!(store.get_string(SettingKey::Token, "").await.unwrap(), "abcd");
            assert!(store.get_bool(SettingKey::ConfigSaved, false).await.unwrap());
            assert_eq!(
                store.get_bool(SettingKey::Token, false).await,
                Err(StoreError::TypeMismatch)
            );

            store.remove(SettingKey::Token).await.unwrap();
            assert_eq!(store.get_string(SettingKey::Token, "gone").await.unwrap(), "gone");
        });
    }

    #[test]
    fn flash_store_survives_many_rewrites() {
        let mut store = FlashStore::new(RamFlash::new(), RamFlash::range());
        block_on(async {
            for i in 0..200u32 {
                let mut value = SettingValue::new();
                core::fmt::write(&mut value, format_args!("{}", i)).unwrap();
                store.put_string(SettingKey::ServerPort, &value).await.unwrap();
            }
            assert_eq!(store.get_string(SettingKey::ServerPort, "").await.unwrap(), "199");
        });
    }

    #[test]
    fn values_over_64_bytes_are_refused() {
        let long = "x".repeat(65);
        let mut memory = MemoryStore::new();
        let mut flash = FlashStore::new(RamFlash::new(), RamFlash::range());
        block_on(async {
            assert_eq!(memory.put_string(SettingKey::Ssid, &long).await, Err(StoreError::ValueTooLong));
            assert_eq!(flash.put_string(SettingKey::Ssid, &long).await, Err(StoreError::ValueTooLong));
            assert!(memory.put_string(SettingKey::Ssid, &long[..64]).await.is_ok());
        });
    }

    #[test]
    fn memory_store_round_trip() {
        let mut store = MemoryStore::new();
        block_on(async {
            store.put_string(SettingKey::Ssid, "home").await.unwrap();
            assert_eq!(store.get_string(SettingKey::Ssid, "").await.unwrap(), "home");
            store.remove(SettingKey::Ssid).await.unwrap();
            assert_eq!(store.get_string(SettingKey::Ssid, "def").await.unwrap(), "def");
            assert_eq!(store.item(SettingKey::Ssid), None);
        });
    }
}
