use bitvec::{order::Msb0, vec::BitVec};

// Bits reserved for every piece.
pub const PIECE_WINDOW: usize = 8;

// Status of a piece as tracked in progress bitsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PieceStatus {
    Waiting,
    Running,
    Success,
    Failed,
    SemiSuccess,
}

impl PieceStatus {

    // Numeric code used on the wire and in the bitset layout.
    pub fn code(self) -> i32 {
        match self {
            PieceStatus::Waiting => -1,
            PieceStatus::Running => 0,
            PieceStatus::Success => 1,
            PieceStatus::Failed => 2,
            PieceStatus::SemiSuccess => -3,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -1 => Some(PieceStatus::Waiting),
            0 => Some(PieceStatus::Running),
            1 => Some(PieceStatus::Success),
            2 => Some(PieceStatus::Failed),
            -3 => Some(PieceStatus::SemiSuccess),
            _ => None,
        }
    }

    // Bit inside the piece window, WAITING owns no bit.
    fn bit(self) -> Option<usize> {
        match self {
            PieceStatus::Waiting => None,
            PieceStatus::Running => Some(0),
            PieceStatus::Success | PieceStatus::SemiSuccess => Some(1),
            PieceStatus::Failed => Some(2),
        }
    }

}

// Piece states packed 8 bits per piece, bit `8n + status` set for piece n.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PieceBitSet {
    bits: BitVec<u8, Msb0>,
}

impl PieceBitSet {

    pub fn new() -> Self {
        Self::default()
    }

    fn test(&self, idx: usize) -> bool {
        self.bits.get(idx).map(|b| *b).unwrap_or(false)
    }

    // Applies a status to piece n. Returns false when the piece is already SUCCESS,
    // which freezes its window.
    pub fn update(&mut self, piece_num: usize, status: PieceStatus) -> bool {
        let start = piece_num * PIECE_WINDOW;
        if self.test(start + 1) {
            return false;
        }
        if self.bits.len() < start + PIECE_WINDOW {
            self.bits.resize(start + PIECE_WINDOW, false);
        }
        self.bits[start..start + PIECE_WINDOW].fill(false);
        if let Some(bit) = status.bit() {
            self.bits.set(start + bit, true);
        }
        true
    }

    // Status of piece n, WAITING when no bit is set.
    pub fn status(&self, piece_num: usize) -> PieceStatus {
        let start = piece_num * PIECE_WINDOW;
        if self.test(start + 1) {
            PieceStatus::Success
        } else if self.test(start) {
            PieceStatus::Running
        } else if self.test(start + 2) {
            PieceStatus::Failed
        } else {
            PieceStatus::Waiting
        }
    }

    pub fn is_success(&self, piece_num: usize) -> bool {
        self.test(piece_num * PIECE_WINDOW + 1)
    }

    // Every set bit as (piece, status).
    pub fn iter_set(&self) -> impl Iterator<Item = (usize, PieceStatus)> + '_ {
        self.bits.iter_ones().filter_map(|idx| {
            let status = match idx % PIECE_WINDOW {
                0 => PieceStatus::Running,
                1 => PieceStatus::Success,
                2 => PieceStatus::Failed,
                _ => return None,
            };
            Some((idx / PIECE_WINDOW, status))
        })
    }

    // Bits set here but not in `other`, as (piece, status).
    pub fn difference<'a>(&'a self, other: &'a PieceBitSet) -> impl Iterator<Item = (usize, PieceStatus)> + 'a {
        self.iter_set().filter(move |(piece, status)| {
            let bit = status.bit().unwrap_or_default();
            !other.test(piece * PIECE_WINDOW + bit)
        })
    }

    pub fn success_pieces(&self) -> Vec<usize> {
        self.iter_set()
            .filter(|(_, s)| *s == PieceStatus::Success)
            .map(|(p, _)| p)
            .collect()
    }

    pub fn success_count(&self) -> usize {
        self.iter_set().filter(|(_, s)| *s == PieceStatus::Success).count()
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_is_final() {
        let mut bs = PieceBitSet::new();
        assert!(bs.update(3, PieceStatus::Running));
        assert_eq!(bs.status(3), PieceStatus::Running);
        assert!(bs.update(3, PieceStatus::Success));
        for status in [PieceStatus::Waiting, PieceStatus::Running, PieceStatus::Failed, PieceStatus::SemiSuccess] {
            assert!(!bs.update(3, status));
            assert_eq!(bs.status(3), PieceStatus::Success);
        }
    }

    #[test]
    fn test_single_bit_per_window() {
        let mut bs = PieceBitSet::new();
        bs.update(0, PieceStatus::Running);
        bs.update(0, PieceStatus::Failed);
        assert_eq!(bs.iter_set().collect::<Vec<_>>(), vec![(0, PieceStatus::Failed)]);
        bs.update(0, PieceStatus::Waiting);
        assert_eq!(bs.iter_set().count(), 0);
        bs.update(1, PieceStatus::SemiSuccess);
        assert_eq!(bs.status(1), PieceStatus::Success);
        assert_eq!(bs.success_pieces(), vec![1]);
    }

    #[test]
    fn test_difference() {
        let mut cdn = PieceBitSet::new();
        let mut client = PieceBitSet::new();
        for n in 0..4 {
            cdn.update(n, PieceStatus::Success);
        }
        cdn.update(5, PieceStatus::Failed);
        client.update(1, PieceStatus::Success);
        client.update(2, PieceStatus::Running);

        let diff: Vec<_> = cdn.difference(&client).collect();
        assert_eq!(diff, vec![
            (0, PieceStatus::Success),
            (2, PieceStatus::Success),
            (3, PieceStatus::Success),
            (5, PieceStatus::Failed),
        ]);
        assert_eq!(cdn.success_count(), 4);
    }

    #[test]
    fn test_codes() {
        for code in [-3, -1, 0, 1, 2] {
            assert_eq!(PieceStatus::from_code(code).map(PieceStatus::code), Some(code));
        }
        assert_eq!(PieceStatus::from_code(7), None);
    }
}
