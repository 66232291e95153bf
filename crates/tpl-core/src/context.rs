// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Indentation breadcrumbs shown above a line that needs input.

use crate::detect::LineRecord;

/// Returns the indices of the lines enclosing `lines[index]` by indentation,
/// top-down, not including `index` itself.
///
/// Walking upwards, a non-blank line is kept when it is indented strictly less
/// than the last kept line. The walk stops after keeping an unindented line.
pub fn fold_context(lines: &[LineRecord], index: usize) -> Vec<usize> {
    let Some(target) = lines.get(index) else {
        return Vec::new();
    };

    let mut context = Vec::new();
    let mut width = target.indent;
    for (position, line) in lines[..index].iter().enumerate().rev() {
        if width == 0 {
            break;
        }
        if line.is_blank() || line.indent >= width {
            continue;
        }
        context.push(position);
        width = line.indent;
    }
    context.reverse();
    context
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(widths: &[usize]) -> Vec<LineRecord> {
        widths
            .iter()
            .enumerate()
            .map(|(n, width)| LineRecord::new(&format!("{}line{n}", " ".repeat(*width)), false))
            .collect()
    }

    #[test]
    fn keeps_strictly_decreasing_ancestors() {
        assert_eq!(fold_context(&lines(&[0, 2, 2, 4, 4]), 4), vec![0, 2]);
    }

    #[test]
    fn unindented_line_has_no_context() {
        assert!(fold_context(&lines(&[0, 2, 0]), 2).is_empty());
    }

    #[test]
    fn skips_blank_lines() {
        let mut records = lines(&[0, 2, 4]);
        records.insert(2, LineRecord::new("", false));
        assert_eq!(fold_context(&records, 3), vec![0, 1]);
    }

    #[test]
    fn stops_at_file_start_without_root_line() {
        assert_eq!(fold_context(&lines(&[2, 4]), 1), vec![0]);
    }

    #[test]
    fn out_of_range_index_is_empty() {
        assert!(fold_context(&lines(&[0]), 3).is_empty());
    }
}
