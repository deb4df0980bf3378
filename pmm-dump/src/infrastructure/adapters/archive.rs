// /////////////////////////////////////////////////////////////////////////////
// pmm-dump
// Copyright (c) 2025 Percona, LLC
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Archive Pipeline and Encryption Layer:
//! `handle <- [AES-256-CTR] <- gzip <- tar`. Only this module
//! touches `tar`, `flate2`, or the AES primitives directly - everything
//! else reads and writes archives through [`ArchiveWriter`]/[`ArchiveReader`].
//!
//! The encryption framing is OpenSSL-compatible: an encrypted stream opens
//! with the literal bytes `Salted__` followed by an 8-byte salt, exactly
//! what `openssl enc -aes-256-ctr -pbkdf2 -salt` produces, so a dump made
//! without this binary's involvement can still be decrypted with the
//! standard `openssl` CLI and vice versa.

use aes::cipher::{KeyIvInit, StreamCipher};
use aes::Aes256;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use pmm_dump_domain::error::{DumpError, DumpResult};
use pmm_dump_domain::services::archive_pipeline::{ArchiveReader, ArchiveWriter, EntryHeader};
use ring::pbkdf2;
use std::io::{self, Cursor, Read, Write};
use std::num::NonZeroU32;

type Aes256Ctr = ctr::Ctr128BE<Aes256>;

const SALT_MAGIC: &[u8; 8] = b"Salted__";
const SALT_LEN: usize = 8;
const PBKDF2_ITERATIONS: u32 = 10_000;
const KEY_IV_LEN: usize = 48; // 32-byte key + 16-byte IV

fn derive_key_iv(password: &str, salt: &[u8; SALT_LEN]) -> ([u8; 32], [u8; 16]) {
    let mut out = [0u8; KEY_IV_LEN];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        NonZeroU32::new(PBKDF2_ITERATIONS).expect("nonzero iteration count"),
        salt,
        password.as_bytes(),
        &mut out,
    );
    let mut key = [0u8; 32];
    let mut iv = [0u8; 16];
    key.copy_from_slice(&out[..32]);
    iv.copy_from_slice(&out[32..]);
    (key, iv)
}

/// Streams plaintext through AES-256-CTR as it is written.
struct CtrWriter {
    inner: Box<dyn Write + Send>,
    cipher: Aes256Ctr,
}

impl Write for CtrWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut chunk = buf.to_vec();
        self.cipher.apply_keystream(&mut chunk);
        self.inner.write(&chunk)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Streams ciphertext through AES-256-CTR as it is read.
struct CtrReader {
    inner: Box<dyn Read + Send>,
    cipher: Aes256Ctr,
}

impl Read for CtrReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.cipher.apply_keystream(&mut buf[..n]);
        Ok(n)
    }
}

/// Write side of the pipeline. Buffers one entry's body between
/// `write_header` calls, since `tar::Builder` wants a complete entry at
/// once but [`ArchiveWriter::write`] is called in a streaming fashion by
/// callers that already hold the full [`pmm_dump_domain::Chunk`] in memory.
pub struct TarGzArchiveWriter {
    builder: tar::Builder<GzEncoder<Box<dyn Write + Send>>>,
    pending: Option<(EntryHeader, Vec<u8>)>,
}

impl TarGzArchiveWriter {
    /// `sink` is the raw file/stdout handle. `password` enables the
    /// encryption layer: a random salt is generated and written first.
    pub fn new(mut sink: Box<dyn Write + Send>, password: Option<&str>) -> DumpResult<Self> {
        let wrapped: Box<dyn Write + Send> = match password {
            Some(password) => {
                let salt = random_salt()?;
                sink.write_all(SALT_MAGIC)?;
                sink.write_all(&salt)?;
                let (key, iv) = derive_key_iv(password, &salt);
                let cipher = Aes256Ctr::new(&key.into(), &iv.into());
                Box::new(CtrWriter { inner: sink, cipher })
            }
            None => sink,
        };
        let gz = GzEncoder::new(wrapped, Compression::best());
        Ok(Self {
            builder: tar::Builder::new(gz),
            pending: None,
        })
    }

    fn flush_pending(&mut self) -> DumpResult<()> {
        if let Some((header, body)) = self.pending.take() {
            let mut tar_header = tar::Header::new_gnu();
            tar_header.set_size(body.len() as u64);
            tar_header.set_mode(header.mode);
            tar_header.set_mtime(header.mtime);
            tar_header.set_cksum();
            self.builder
                .append_data(&mut tar_header, &header.name, body.as_slice())
                .map_err(DumpError::from)?;
        }
        Ok(())
    }
}

impl ArchiveWriter for TarGzArchiveWriter {
    fn write_header(&mut self, header: &EntryHeader) -> DumpResult<()> {
        self.flush_pending()?;
        self.pending = Some((header.clone(), Vec::new()));
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> DumpResult<()> {
        match &mut self.pending {
            Some((_, body)) => {
                body.extend_from_slice(bytes);
                Ok(())
            }
            None => Err(DumpError::internal("write called before write_header")),
        }
    }

    fn close(mut self: Box<Self>) -> DumpResult<()> {
        self.flush_pending()?;
        let gz = self.builder.into_inner().map_err(DumpError::from)?;
        gz.finish().map_err(DumpError::from)?;
        Ok(())
    }
}

/// Read side, the mirror image of [`TarGzArchiveWriter`]. Reads raw 512-byte
/// tar blocks directly instead of going through `tar::Archive`'s borrowing
/// iterator, so header and body reads can interleave freely at the caller's
/// pace (`next_header` then `read_all`, repeated).
pub struct TarGzArchiveReader {
    inner: Box<dyn Read + Send>,
    pending_size: u64,
}

const BLOCK_SIZE: usize = 512;

impl TarGzArchiveReader {
    /// `source` is the raw file/stdin handle. Auto-detects the encryption
    /// layer by sniffing the `Salted__` magic; `password` is required only
    /// if that magic is present.
    pub fn new(mut source: Box<dyn Read + Send>, password: Option<&str>) -> DumpResult<Self> {
        let mut prefix = [0u8; SALT_MAGIC.len()];
        let read = read_fill(&mut source, &mut prefix)?;

        let inner: Box<dyn Read + Send> = if read == prefix.len() && &prefix == SALT_MAGIC {
            let password = password.ok_or_else(|| DumpError::encryption("archive is encrypted but no password was supplied"))?;
            let mut salt = [0u8; SALT_LEN];
            source.read_exact(&mut salt).map_err(|_| DumpError::corrupt_archive("truncated encryption salt header"))?;
            let (key, iv) = derive_key_iv(password, &salt);
            let cipher = Aes256Ctr::new(&key.into(), &iv.into());
            Box::new(GzDecoder::new(CtrReader { inner: source, cipher }))
        } else {
            // Not encrypted: the bytes already peeked are the start of the
            // gzip stream and must be fed back in ahead of the rest.
            let prefix = Cursor::new(prefix[..read].to_vec());
            Box::new(GzDecoder::new(prefix.chain(source)))
        };

        Ok(Self { inner, pending_size: 0 })
    }
}

impl ArchiveReader for TarGzArchiveReader {
    fn next_header(&mut self) -> DumpResult<Option<EntryHeader>> {
        let mut block = [0u8; BLOCK_SIZE];
        let read = read_fill(&mut self.inner, &mut block)?;
        if read == 0 || block.iter().all(|b| *b == 0) {
            return Ok(None);
        }
        if read != BLOCK_SIZE {
            return Err(DumpError::corrupt_archive("truncated tar header block"));
        }

        let mut header = tar::Header::new_gnu();
        header.as_mut_bytes().copy_from_slice(&block);
        let name = header
            .path()
            .map_err(|e| DumpError::corrupt_archive(e.to_string()))?
            .to_string_lossy()
            .into_owned();
        let size = header.entry_size().map_err(|e| DumpError::corrupt_archive(e.to_string()))?;
        let mode = header.mode().unwrap_or(0o644);
        let mtime = header.mtime().unwrap_or(0);
        self.pending_size = size;
        Ok(Some(EntryHeader { name, size, mode, mtime }))
    }

    fn read_all(&mut self) -> DumpResult<Vec<u8>> {
        let size = self.pending_size as usize;
        let mut body = vec![0u8; size];
        self.inner.read_exact(&mut body).map_err(|_| DumpError::corrupt_archive("truncated tar entry body"))?;

        let padding = (BLOCK_SIZE - (size % BLOCK_SIZE)) % BLOCK_SIZE;
        if padding > 0 {
            let mut pad = vec![0u8; padding];
            self.inner
                .read_exact(&mut pad)
                .map_err(|_| DumpError::corrupt_archive("truncated tar entry padding"))?;
        }
        Ok(body)
    }
}

fn random_salt() -> DumpResult<[u8; SALT_LEN]> {
    use ring::rand::{SecureRandom, SystemRandom};
    let mut salt = [0u8; SALT_LEN];
    SystemRandom::new()
        .fill(&mut salt)
        .map_err(|_| DumpError::encryption("failed to generate a random salt"))?;
    Ok(salt)
}

/// Like `read_exact` but tolerates a short final read (EOF) instead of
/// erroring, returning how many bytes actually landed in `buf`.
fn read_fill(reader: &mut impl Read, buf: &mut [u8]) -> DumpResult<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = reader.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A `Vec<u8>`-backed sink that stays readable after being boxed into a
    /// `dyn Write`, since the tests need the bytes back out once closed.
    #[derive(Clone, Default)]
    struct SharedBuffer(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn round_trip(password: Option<&str>) {
        let sink = SharedBuffer::default();
        let writer = TarGzArchiveWriter::new(Box::new(sink.clone()), password).unwrap();
        let mut writer: Box<dyn ArchiveWriter> = Box::new(writer);
        writer.write_header(&EntryHeader::new("meta.json", 0)).unwrap();
        writer.write(br#"{"hello":"world"}"#).unwrap();
        writer.write_header(&EntryHeader::new("vm/0-100.bin", 0)).unwrap();
        writer.write(b"vm-chunk-body").unwrap();
        writer.close().unwrap();

        let buf = sink.0.lock().unwrap().clone();
        let reader = TarGzArchiveReader::new(Box::new(Cursor::new(buf)), password).unwrap();
        let mut reader: Box<dyn ArchiveReader> = Box::new(reader);

        let h1 = reader.next_header().unwrap().unwrap();
        assert_eq!(h1.name, "meta.json");
        assert_eq!(reader.read_all().unwrap(), br#"{"hello":"world"}"#.to_vec());

        let h2 = reader.next_header().unwrap().unwrap();
        assert_eq!(h2.name, "vm/0-100.bin");
        assert_eq!(reader.read_all().unwrap(), b"vm-chunk-body".to_vec());

        assert!(reader.next_header().unwrap().is_none());
    }

    #[test]
    fn round_trips_without_encryption() {
        round_trip(None);
    }

    #[test]
    fn round_trips_with_encryption() {
        round_trip(Some("correct horse battery staple"));
    }

    #[test]
    fn wrong_password_does_not_decode_as_valid_gzip() {
        let sink = SharedBuffer::default();
        let writer = TarGzArchiveWriter::new(Box::new(sink.clone()), Some("right-password")).unwrap();
        let mut writer: Box<dyn ArchiveWriter> = Box::new(writer);
        writer.write_header(&EntryHeader::new("meta.json", 0)).unwrap();
        writer.write(b"{}").unwrap();
        writer.close().unwrap();

        let buf = sink.0.lock().unwrap().clone();
        let mut reader = TarGzArchiveReader::new(Box::new(Cursor::new(buf)), Some("wrong-password")).unwrap();
        assert!(reader.next_header().is_err());
    }
}
