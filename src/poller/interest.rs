use std::fmt;
use std::ops;

const READABLE: u8 = 0b001;
const WRITABLE: u8 = 0b010;
const ERROR: u8 = 0b100;

/// What kind of readiness a registration cares about.
///
/// Mirrors the teacher's `Interest` bitset (`mio::Interest`), reduced to the
/// three kinds `spec.md` §4.4 names: `Read`, `Write`, `Error`. Platform
/// selectors fold `Error` into whatever vendor-specific bits compose to an
/// error condition (`EPOLLRDHUP | EPOLLPRI | EPOLLERR | EPOLLHUP` and
/// equivalents).
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Interest(u8);

impl Interest {
    pub const READABLE: Interest = Interest(READABLE);
    pub const WRITABLE: Interest = Interest(WRITABLE);
    pub const ERROR: Interest = Interest(ERROR);
    pub(crate) const NONE: Interest = Interest(0);

    pub const fn add(self, other: Interest) -> Interest {
        Interest(self.0 | other.0)
    }

    pub fn is_readable(self) -> bool {
        self.0 & READABLE != 0
    }

    pub fn is_writable(self) -> bool {
        self.0 & WRITABLE != 0
    }

    pub fn is_error(self) -> bool {
        self.0 & ERROR != 0
    }
}

impl ops::BitOr for Interest {
    type Output = Interest;
    fn bitor(self, rhs: Interest) -> Interest {
        self.add(rhs)
    }
}

impl ops::BitOrAssign for Interest {
    fn bitor_assign(&mut self, rhs: Interest) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Interest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        macro_rules! flag {
            ($flag: ident, $name: expr) => {
                if self.0 & $flag != 0 {
                    if !first {
                        f.write_str(" | ")?;
                    }
                    f.write_str($name)?;
                    first = false;
                }
            };
        }
        flag!(READABLE, "READABLE");
        flag!(WRITABLE, "WRITABLE");
        flag!(ERROR, "ERROR");
        Ok(())
    }
}

/// Opaque identifier a registration is tagged with and handed back on every
/// readiness callback for it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(pub usize);
