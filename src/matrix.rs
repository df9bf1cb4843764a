use std::ops::Index;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{len} values do not fill rows of {ncols} columns")]
    RaggedRows { len: usize, ncols: usize },
}

/// Row-major dense matrix.
#[derive(Debug, Clone)]
pub struct Matrix<T>
where
    T: Copy + Default,
{
    data: Vec<T>,
    ncols: usize,
    nrows: usize,
}

impl<T> Matrix<T>
where
    T: Copy + Default,
{
    pub fn transpose(&mut self) {
        let mut data2 = Vec::<T>::with_capacity(self.data.len());
        for col in 0..self.ncols {
            for row in 0..self.nrows {
                data2.push(self.get_at(row, col));
            }
        }
        *self = Self {
            data: data2,
            ncols: self.nrows,
            nrows: self.ncols,
        };
    }

    /// Keep only the first `nrows` rows.
    pub fn truncate_rows(&mut self, nrows: usize) {
        if nrows >= self.nrows {
            return;
        }
        self.data.truncate(nrows * self.ncols);
        self.nrows = nrows;
    }

    pub fn get_nrows(&self) -> usize {
        self.nrows
    }
    pub fn get_ncols(&self) -> usize {
        self.ncols
    }

    pub fn get_at(&self, row: usize, col: usize) -> T {
        self.data[self.ncols * row + col]
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data[..]
    }
}

impl<T> Index<usize> for Matrix<T>
where
    T: Copy + Default,
{
    type Output = [T];
    fn index(&self, index: usize) -> &Self::Output {
        let s = index * self.ncols;
        let e = s + self.ncols;
        &self.data[s..e]
    }
}

pub struct MatrixBuilder<T: Copy + Default> {
    data: Vec<T>,
    ncols: usize,
}

impl<T> MatrixBuilder<T>
where
    T: Copy + Default,
{
    pub fn new(ncols: usize) -> Self {
        Self {
            data: vec![],
            ncols,
        }
    }

    pub fn push(&mut self, val: T) {
        self.data.push(val);
    }

    /// Build the matrix; the pushed values must fill whole rows.
    pub fn finish(&mut self) -> Result<Matrix<T>, Error> {
        let len = self.data.len();
        let nrows = match self.ncols {
            0 if len == 0 => 0,
            n if n > 0 && len % n == 0 => len / n,
            ncols => return Err(Error::RaggedRows { len, ncols }),
        };
        Ok(Matrix {
            data: std::mem::take(&mut self.data),
            ncols: self.ncols,
            nrows,
        })
    }
}

#[test]
fn test_transpose_and_truncate() {
    let mut b = MatrixBuilder::<u8>::new(3);
    for x in [0, 1, 2, 3, 0, 1] {
        b.push(x);
    }
    let mut m = b.finish().unwrap();
    assert_eq!(m.get_nrows(), 2);
    assert_eq!(&m[1], &[3, 0, 1]);

    m.transpose();
    assert_eq!(m.get_nrows(), 3);
    assert_eq!(&m[0], &[0, 3]);
    assert_eq!(m.get_at(2, 1), 1);

    m.truncate_rows(2);
    assert_eq!(m.get_nrows(), 2);
    assert_eq!(m.as_slice(), &[0, 3, 1, 0]);
}

#[test]
fn test_builder_ragged_rows() {
    let mut b = MatrixBuilder::<u8>::new(2);
    for x in [0, 1, 2] {
        b.push(x);
    }
    assert!(matches!(
        b.finish(),
        Err(Error::RaggedRows { len: 3, ncols: 2 })
    ));

    let mut b = MatrixBuilder::<u8>::new(0);
    assert_eq!(b.finish().unwrap().get_nrows(), 0);
    b.push(1);
    assert!(b.finish().is_err());
}
