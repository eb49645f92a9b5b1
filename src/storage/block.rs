use super::{Error, Result};
use crate::zfx_id::Id;

use byteorder::BigEndian;
use zerocopy::{byteorder::U64, AsBytes, FromBytes, Unaligned};

/// Key of the accepted index: blocks sort by height.
#[derive(Clone, FromBytes, AsBytes, Unaligned)]
#[repr(C)]
pub struct Key {
    pub height: U64<BigEndian>,
    pub hash: [u8; 32],
}

impl Key {
    pub fn new(height: u64, id: &Id) -> Key {
        Key { height: U64::new(height), hash: id.bytes() }
    }
}

#[derive(Clone, FromBytes, AsBytes, Unaligned)]
#[repr(C)]
pub struct KeyPrefix {
    pub height: U64<BigEndian>,
}

impl KeyPrefix {
    pub fn new(height: u64) -> KeyPrefix {
        KeyPrefix { height: U64::new(height) }
    }
}

/// Stores the encoding of a block, accepted or not.
pub fn put_block(blocks: &sled::Tree, id: &Id, bytes: &[u8]) -> Result<()> {
    let _ = blocks.insert(id.as_bytes(), bytes)?;
    Ok(())
}

/// Fetches the encoding of a block.
pub fn get_block(blocks: &sled::Tree, id: &Id) -> Result<Option<Vec<u8>>> {
    Ok(blocks.get(id.as_bytes())?.map(|v| v.to_vec()))
}

/// Adds a block to the accepted index, ensuring it is one above the last accepted block.
/// The first block accepted is the genesis block.
pub fn accept_block(accepted: &sled::Tree, height: u64, id: &Id) -> Result<()> {
    if let Some((last, _)) = get_last_accepted(accepted)? {
        if height != last + 1 {
            return Err(Error::InvalidHeight { last, height });
        }
    }
    let key = Key::new(height, id);
    let _ = accepted.insert(key.as_bytes(), Vec::<u8>::new())?;
    Ok(())
}

/// Height and id of the last accepted block.
pub fn get_last_accepted(accepted: &sled::Tree) -> Result<Option<(u64, Id)>> {
    match accepted.last()? {
        Some((k, _)) => {
            let key = Key::read_from(k.as_ref()).ok_or(Error::InvalidKey)?;
            Ok(Some((key.height.get(), Id::from(key.hash))))
        }
        None => Ok(None),
    }
}

/// The accepted block at `height`.
pub fn get_accepted_at(accepted: &sled::Tree, height: u64) -> Result<Option<Id>> {
    let prefix = KeyPrefix::new(height);
    match accepted.scan_prefix(prefix.as_bytes()).next() {
        Some(kv) => {
            let (k, _) = kv?;
            let key = Key::read_from(k.as_ref()).ok_or(Error::InvalidKey)?;
            Ok(Some(Id::from(key.hash)))
        }
        None => Ok(None),
    }
}

/// Checks whether `id` is the accepted block at `height`.
pub fn is_accepted(accepted: &sled::Tree, height: u64, id: &Id) -> Result<bool> {
    let key = Key::new(height, id);
    Ok(accepted.contains_key(key.as_bytes())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_rt::test]
    async fn test_accepted_index() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let accepted = db.open_tree("accepted").unwrap();
        let (g, a, b) = (Id::new(b"g"), Id::new(b"a"), Id::new(b"b"));

        assert_eq!(get_last_accepted(&accepted).unwrap(), None);
        accept_block(&accepted, 0, &g).unwrap();
        accept_block(&accepted, 1, &a).unwrap();
        assert!(matches!(
            accept_block(&accepted, 3, &b),
            Err(Error::InvalidHeight { last: 1, height: 3 })
        ));
        accept_block(&accepted, 2, &b).unwrap();

        assert_eq!(get_last_accepted(&accepted).unwrap(), Some((2, b)));
        assert_eq!(get_accepted_at(&accepted, 1).unwrap(), Some(a));
        assert_eq!(get_accepted_at(&accepted, 5).unwrap(), None);
        assert!(is_accepted(&accepted, 0, &g).unwrap());
        assert!(!is_accepted(&accepted, 1, &b).unwrap());
    }

    #[actix_rt::test]
    async fn test_heights_sort_numerically() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let accepted = db.open_tree("accepted").unwrap();
        for height in 0..300u64 {
            accept_block(&accepted, height, &Id::new(&height.to_be_bytes())).unwrap();
        }
        // Big endian keys keep 256 after 255
        assert_eq!(get_last_accepted(&accepted).unwrap(), Some((299, Id::new(&299u64.to_be_bytes()))));
    }

    #[actix_rt::test]
    async fn test_blocks() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let blocks = db.open_tree("blocks").unwrap();
        let id = Id::new(b"block");
        assert_eq!(get_block(&blocks, &id).unwrap(), None);
        put_block(&blocks, &id, b"bytes").unwrap();
        assert_eq!(get_block(&blocks, &id).unwrap(), Some(b"bytes".to_vec()));
    }
}
