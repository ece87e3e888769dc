//! Password protection
//!
//! Implements the PDF Standard Security Handler at revision 3: a 128-bit RC4
//! key derived from the password, the owner entry and the file identifier.
//! Every string and stream of every object is encrypted with a per-object key.
//! The page tree structure stays readable, so page counting still works on a
//! protected document.

use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat};
use md5::{Digest, Md5};
use rc4::{consts::U16, KeyInit, Rc4, StreamCipher};

use crate::error::PdfMergeError;

/// Password padding string from the PDF specification
const PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01,
    0x08, 0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53,
    0x69, 0x7A,
];

const KEY_LEN: usize = 16;
const VERSION: i64 = 2;
const REVISION: i64 = 3;

/// All permission bits set; the two low bits are reserved and must be zero
const ALL_PERMISSIONS: i32 = -4;

type Key = [u8; KEY_LEN];

/// Encrypt a PDF so it only opens with `password`
///
/// The same password is used as owner password.
pub fn protect_document(bytes: &[u8], password: &str) -> Result<Vec<u8>, PdfMergeError> {
    if password.is_empty() {
        return Err(PdfMergeError::EncryptionError("Password must not be empty".into()));
    }

    let mut doc = Document::load_mem(bytes).map_err(|e| PdfMergeError::ParseError(e.to_string()))?;
    if doc.is_encrypted() {
        return Err(PdfMergeError::EncryptionError(
            "Document is already password protected".into(),
        ));
    }

    let file_id = uuid::Uuid::new_v4().into_bytes();
    let owner = owner_entry(password.as_bytes(), password.as_bytes());
    let key = encryption_key(password.as_bytes(), &owner, ALL_PERMISSIONS, &file_id);
    let user = user_entry(&key, &file_id);

    for (&id, object) in doc.objects.iter_mut() {
        crypt_object(&key, id, object);
    }

    let mut encrypt = Dictionary::new();
    encrypt.set("Filter", Object::Name(b"Standard".to_vec()));
    encrypt.set("V", Object::Integer(VERSION));
    encrypt.set("R", Object::Integer(REVISION));
    encrypt.set("Length", Object::Integer((KEY_LEN * 8) as i64));
    encrypt.set("O", Object::String(owner.to_vec(), StringFormat::Hexadecimal));
    encrypt.set("U", Object::String(user.to_vec(), StringFormat::Hexadecimal));
    encrypt.set("P", Object::Integer(ALL_PERMISSIONS as i64));
    // Added after the loop above: the encryption dictionary itself stays in the clear
    let encrypt_id = doc.add_object(Object::Dictionary(encrypt));

    doc.trailer.set("Encrypt", Object::Reference(encrypt_id));
    doc.trailer.set(
        "ID",
        Object::Array(vec![
            Object::String(file_id.to_vec(), StringFormat::Hexadecimal),
            Object::String(file_id.to_vec(), StringFormat::Hexadecimal),
        ]),
    );

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).map_err(|e| {
        PdfMergeError::EncryptionError(format!("Failed to save protected PDF: {}", e))
    })?;

    Ok(buffer)
}

/// Open a document produced by [`protect_document`] with its password
///
/// Decryption is left to lopdf's own security handler, so a protected file is
/// checked by an implementation independent of the one that wrote it.
/// Returns the decrypted document, or [`PdfMergeError::WrongPassword`].
pub fn unlock_document(bytes: &[u8], password: &str) -> Result<Document, PdfMergeError> {
    let mut doc = Document::load_mem(bytes).map_err(|e| PdfMergeError::ParseError(e.to_string()))?;
    if !doc.is_encrypted() {
        return Err(PdfMergeError::EncryptionError(
            "Document is not password protected".into(),
        ));
    }

    if lopdf::encryption::get_encryption_key(&doc, password, true).is_err() {
        return Err(PdfMergeError::WrongPassword);
    }

    doc.decrypt(password)
        .map_err(|e| PdfMergeError::EncryptionError(format!("Failed to decrypt: {}", e)))?;

    Ok(doc)
}

/// True when the bytes parse as a PDF carrying an encryption dictionary
pub fn is_protected(bytes: &[u8]) -> bool {
    Document::load_mem(bytes)
        .map(|doc| doc.trailer.has(b"Encrypt"))
        .unwrap_or(false)
}

fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut padded = PADDING;
    let len = password.len().min(32);
    padded[..len].copy_from_slice(&password[..len]);
    padded[len..].copy_from_slice(&PADDING[..32 - len]);
    padded
}

fn md5_rehash(mut digest: Key, rounds: usize) -> Key {
    for _ in 0..rounds {
        digest = Md5::digest(digest).into();
    }
    digest
}

fn rc4(key: &Key, data: &mut [u8]) {
    let mut cipher = Rc4::<U16>::new(key.into());
    cipher.apply_keystream(data);
}

/// Revision 3 runs RC4 twenty times, XOR-ing the key with the round number
fn rc4_rounds(key: &Key, data: &mut [u8]) {
    for round in 0..20u8 {
        let round_key = key.map(|b| b ^ round);
        rc4(&round_key, data);
    }
}

/// Algorithm 3: the /O entry
fn owner_entry(owner_password: &[u8], user_password: &[u8]) -> [u8; 32] {
    let digest: Key = Md5::digest(pad_password(owner_password)).into();
    let key = md5_rehash(digest, 50);

    let mut entry = pad_password(user_password);
    rc4_rounds(&key, &mut entry);
    entry
}

/// Algorithm 2: the file encryption key
fn encryption_key(password: &[u8], owner_entry: &[u8], permissions: i32, file_id: &[u8]) -> Key {
    let mut hasher = Md5::new();
    hasher.update(pad_password(password));
    hasher.update(owner_entry);
    hasher.update(permissions.to_le_bytes());
    hasher.update(file_id);
    md5_rehash(hasher.finalize().into(), 50)
}

/// Algorithm 5: the /U entry
fn user_entry(key: &Key, file_id: &[u8]) -> [u8; 32] {
    let mut hasher = Md5::new();
    hasher.update(PADDING);
    hasher.update(file_id);
    let mut head: Key = hasher.finalize().into();
    rc4_rounds(key, &mut head);

    let mut entry = [0u8; 32];
    entry[..KEY_LEN].copy_from_slice(&head);
    entry[KEY_LEN..].copy_from_slice(&PADDING[..KEY_LEN]);
    entry
}

/// Algorithm 1: key for one indirect object
fn object_key(key: &Key, id: ObjectId) -> Key {
    let mut hasher = Md5::new();
    hasher.update(key);
    hasher.update(&id.0.to_le_bytes()[..3]);
    hasher.update(id.1.to_le_bytes());
    hasher.finalize().into()
}

fn crypt_object(key: &Key, id: ObjectId, object: &mut Object) {
    let object_key = object_key(key, id);
    crypt_in_place(&object_key, object);
}

fn crypt_in_place(object_key: &Key, object: &mut Object) {
    match object {
        Object::String(bytes, _) => rc4(object_key, bytes),
        Object::Array(items) => {
            for item in items.iter_mut() {
                crypt_in_place(object_key, item);
            }
        }
        Object::Dictionary(dict) => {
            for (_, value) in dict.iter_mut() {
                crypt_in_place(object_key, value);
            }
        }
        Object::Stream(stream) => {
            // Cross-reference streams are never encrypted
            if matches!(stream.dict.get(b"Type"), Ok(Object::Name(name)) if name == b"XRef") {
                return;
            }
            for (_, value) in stream.dict.iter_mut() {
                crypt_in_place(object_key, value);
            }
            rc4(object_key, &mut stream.content);
        }
        _ => {}
    }
}
