use itertools::Itertools;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("sites span more than one chromosome: {first} and {other}")]
    MultipleChromosomes { first: String, other: String },
    #[error("site positions must be strictly increasing: {prev} followed by {next}")]
    Unsorted { prev: u32, next: u32 },
}

/// Ordered genomic sites on a single chromosome.
#[derive(Debug, Clone, Default)]
pub struct Sites {
    chrname: String,
    pos: Vec<u32>,
}

impl Sites {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, chrname: &str, pos: u32) -> Result<()> {
        if self.pos.is_empty() {
            self.chrname.clear();
            self.chrname.push_str(chrname);
        } else if self.chrname != chrname {
            return Err(Error::MultipleChromosomes {
                first: self.chrname.clone(),
                other: chrname.to_owned(),
            });
        }
        self.pos.push(pos);
        Ok(())
    }

    /// Check the strictly increasing invariant.
    pub fn finish(&self) -> Result<()> {
        match self
            .pos
            .iter()
            .tuple_windows()
            .find(|(prev, next)| prev >= next)
        {
            Some((prev, next)) => Err(Error::Unsorted {
                prev: *prev,
                next: *next,
            }),
            None => Ok(()),
        }
    }

    pub fn truncate(&mut self, n: usize) {
        self.pos.truncate(n);
    }

    pub fn len(&self) -> usize {
        self.pos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pos.is_empty()
    }

    pub fn get_chrname(&self) -> &str {
        &self.chrname
    }

    pub fn get_pos_slice(&self) -> &[u32] {
        &self.pos[..]
    }
}

#[test]
fn test_sites_invariants() {
    let mut sites = Sites::new();
    sites.add("1", 10).unwrap();
    sites.add("1", 20).unwrap();
    assert!(sites.finish().is_ok());
    assert!(matches!(
        sites.add("2", 30),
        Err(Error::MultipleChromosomes { .. })
    ));
    sites.add("1", 20).unwrap();
    assert!(matches!(
        sites.finish(),
        Err(Error::Unsorted { prev: 20, next: 20 })
    ));
    sites.truncate(2);
    assert_eq!(sites.get_pos_slice(), &[10, 20]);
    assert_eq!(sites.get_chrname(), "1");
}
