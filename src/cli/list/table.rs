use std::fmt::{self, Write};

/// A row of cells. Rows are built from vectors of strings.
pub(crate) struct Row {
    cells: Vec<String>,
}

impl Row {
    fn columns(&self) -> usize {
        self.cells.len()
    }
}

impl From<Vec<String>> for Row {
    fn from(cells: Vec<String>) -> Self {
        Row { cells }
    }
}

impl From<Vec<&str>> for Row {
    fn from(cells: Vec<&str>) -> Self {
        Row {
            cells: cells.into_iter().map(str::to_owned).collect(),
        }
    }
}

/// A plain-text table. Columns are left aligned and separated by two spaces,
/// header names contain no whitespace so the output can be split with awk.
pub(crate) struct Table {
    header: Vec<&'static str>,
    body: Vec<Row>,
    print_header: bool,
}

impl Table {
    pub(crate) fn with_header(header: Vec<&'static str>) -> Table {
        debug_assert!(
            header.iter().all(|h| !h.contains(char::is_whitespace)),
            "table header should not contain whitespace"
        );

        Table {
            header,
            body: Vec::new(),
            print_header: true,
        }
    }

    pub(crate) fn print_header(&mut self, print_header: bool) {
        self.print_header = print_header;
    }

    /// Rows must have one cell per header column.
    pub(crate) fn add_row<R: Into<Row>>(&mut self, row: R) {
        let row = row.into();

        debug_assert_eq!(row.columns(), self.header.len());

        self.body.push(row);
    }

    fn column_widths(&self) -> Vec<usize> {
        let mut widths: Vec<usize> = self.header.iter().map(|h| h.len()).collect();

        for row in &self.body {
            for (width, cell) in widths.iter_mut().zip(&row.cells) {
                *width = (*width).max(cell.chars().count());
            }
        }

        widths
    }
}

fn write_row<'c, I>(f: &mut fmt::Formatter<'_>, cells: I, widths: &[usize]) -> fmt::Result
where
    I: Iterator<Item = &'c str>,
{
    let mut line = String::new();

    for (i, (cell, width)) in cells.zip(widths).enumerate() {
        if i != 0 {
            line.push_str("  ");
        }

        write!(line, "{:<width$}", cell, width = *width)?;
    }

    writeln!(f, "{}", line.trim_end())
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let widths = self.column_widths();

        if self.print_header {
            write_row(f, self.header.iter().copied(), &widths)?;
        }

        for row in &self.body {
            write_row(f, row.cells.iter().map(String::as_str), &widths)?;
        }

        Ok(())
    }
}
